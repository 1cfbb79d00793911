use std::sync::Arc;
use tracing::info;

use crate::account::phone;
use crate::account::{Account, AccountStore, Creation};
use crate::error::PipelineError;

/// What the gate decided for one submission.
#[derive(Debug, Clone)]
pub enum Admission {
    /// New record, capacity reserved.
    Created(Account),
    /// Same owner, pipeline still running.
    Resume(Account),
    /// Same owner, already decided.
    Terminal(Account),
}

impl Admission {
    pub fn account(&self) -> &Account {
        match self {
            Admission::Created(a) | Admission::Resume(a) | Admission::Terminal(a) => a,
        }
    }
}

pub struct EligibilityGate {
    store: Arc<AccountStore>,
}

impl EligibilityGate {
    pub fn new(store: Arc<AccountStore>) -> Self {
        Self { store }
    }

    /// Runs before any provider call. Duplicate numbers resolve to the stored
    /// record; new numbers are inserted together with their capacity unit.
    pub fn admit(&self, phone_input: &str, user_id: &str, now: u64) -> Result<Admission, PipelineError> {
        if user_id.trim().is_empty() {
            return Err(PipelineError::InvalidInput("user id is required".to_string()));
        }
        let phone_number = phone::normalize(phone_input)?;

        if let Some(existing) = self.store.find_by_phone(&phone_number)? {
            return classify(existing, user_id);
        }

        let policy = self
            .store
            .resolve_country(&phone_number)?
            .ok_or(PipelineError::CountryNotSupported)?;
        if !policy.active {
            return Err(PipelineError::CountryInactive(policy.name));
        }
        if !policy.has_capacity() {
            return Err(PipelineError::NoCapacity(policy.name));
        }

        let account = Account::new(
            uuid::Uuid::new_v4().to_string(),
            phone_number,
            user_id.to_string(),
            &policy,
            now,
        );

        match self.store.create_with_capacity(&account)? {
            Creation::Created(account, written) => {
                info!(
                    "📱 Account {} created for {} (country {}, {}/{})",
                    account.id,
                    phone::mask(&account.phone_number),
                    written.code,
                    written.used_capacity,
                    written.max_capacity
                );
                Ok(Admission::Created(account))
            }
            Creation::Existing(existing) => classify(existing, user_id),
        }
    }
}

fn classify(existing: Account, user_id: &str) -> Result<Admission, PipelineError> {
    if existing.owner_user_id != user_id {
        return Err(PipelineError::AlreadyClaimed);
    }
    if existing.is_terminal() {
        Ok(Admission::Terminal(existing))
    } else {
        Ok(Admission::Resume(existing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountStatus, CountryPolicy};
    use crate::storage::Storage;

    fn gate_with(max: u32) -> (EligibilityGate, Arc<AccountStore>) {
        let store = Arc::new(AccountStore::new(Arc::new(Storage::temporary().unwrap())).unwrap());
        store
            .upsert_country(&CountryPolicy {
                code: "1999".into(),
                name: "Testland".into(),
                max_capacity: max,
                used_capacity: 0,
                reward_amount: 10,
                wait_minutes: 60,
                active: true,
            })
            .unwrap();
        (EligibilityGate::new(store.clone()), store)
    }

    #[test]
    fn test_capacity_scenario() {
        let (gate, store) = gate_with(1);

        let first = gate.admit("+19995550001", "u1", 0).unwrap();
        assert!(matches!(first, Admission::Created(_)));
        assert_eq!(store.get_country("1999").unwrap().unwrap().used_capacity, 1);

        assert!(matches!(
            gate.admit("+19995550001", "u2", 0),
            Err(PipelineError::AlreadyClaimed)
        ));
        assert!(matches!(
            gate.admit("+19995550002", "u1", 0),
            Err(PipelineError::NoCapacity(_))
        ));
        assert_eq!(store.get_country("1999").unwrap().unwrap().used_capacity, 1);
    }

    #[test]
    fn test_same_owner_resumes_or_sees_terminal() {
        let (gate, store) = gate_with(5);
        let created = gate.admit("+1 999 555 0001", "u1", 0).unwrap();
        let id = created.account().id.clone();

        match gate.admit("+19995550001", "u1", 0).unwrap() {
            Admission::Resume(a) => assert_eq!(a.id, id),
            other => panic!("expected resume, got {:?}", other),
        }

        store.reject(&id, "test", Default::default(), 1).unwrap();
        assert!(matches!(
            gate.admit("+19995550001", "u1", 0).unwrap(),
            Admission::Terminal(a) if a.status == AccountStatus::Rejected
        ));
        assert_eq!(store.get_country("1999").unwrap().unwrap().used_capacity, 1);
    }

    #[test]
    fn test_unknown_and_malformed_numbers() {
        let (gate, _) = gate_with(5);
        assert!(matches!(
            gate.admit("+447700900000", "u1", 0),
            Err(PipelineError::CountryNotSupported)
        ));
        assert!(matches!(gate.admit("12ab", "u1", 0), Err(PipelineError::InvalidInput(_))));
        assert!(matches!(gate.admit("+19995550001", " ", 0), Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn test_concurrent_double_submission_creates_one_account() {
        let (gate, store) = gate_with(10);
        let gate = Arc::new(gate);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || gate.admit("+19995550001", "u1", 0))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();

        let created = results.iter().filter(|r| matches!(r, Admission::Created(_))).count();
        assert_eq!(created, 1);
        let ids: std::collections::HashSet<_> = results.iter().map(|r| r.account().id.clone()).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.list_by_owner("u1").unwrap().len(), 1);
        assert_eq!(store.get_country("1999").unwrap().unwrap().used_capacity, 1);
    }

    #[test]
    fn test_concurrent_submissions_never_overshoot_capacity() {
        let (gate, store) = gate_with(3);
        let gate = Arc::new(gate);

        let handles: Vec<_> = (0..12)
            .map(|i| {
                let gate = gate.clone();
                std::thread::spawn(move || gate.admit(&format!("+1999555{:04}", i), "u1", 0))
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let created = outcomes.iter().filter(|r| matches!(r, Ok(Admission::Created(_)))).count();
        let refused = outcomes
            .iter()
            .filter(|r| matches!(r, Err(PipelineError::NoCapacity(_))))
            .count();
        assert_eq!(created, 3);
        assert_eq!(refused, 9);
        assert_eq!(store.get_country("1999").unwrap().unwrap().used_capacity, 3);
    }
}
