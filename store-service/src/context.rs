//! Request context: the caller's trust class and identity, plus the
//! injected clock the service layer reads timestamps from. Replaces the
//! "global singleton" pattern spec.md §9 calls out — both are constructed
//! by whatever sits in front of this crate (the RPC layer, or a test
//! harness) and passed in rather than reached for globally.

use chrono::{DateTime, Utc};
use store_core::truncate_to_micros;

/// The two permission classes spec.md §1/§6.1 describe. Enforcing which
/// class a given caller belongs to (authentication) is out of scope; this
/// crate only acts on the classification once it's been made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerTrust {
    Public,
    Trusted,
}

/// The identity audit attributes are stamped with (spec.md §4.4 "mandatory
/// audit attributes").
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub user_id: String,
    pub user_name: String,
}

impl CallerIdentity {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        CallerIdentity { user_id: user_id.into(), user_name: user_name.into() }
    }
}

/// Supplies the current time, truncated to the microsecond grid every
/// stored and compared timestamp lives on (spec.md §9 "Time resolution").
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        truncate_to_micros(Utc::now())
    }
}

#[cfg(test)]
pub(crate) struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
