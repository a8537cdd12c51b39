//! Keywords shared by the processes on a bus.
//!
//! Any string works as a keyword; these are the ones every participant
//! knows about.

/// Serialized system state.
pub const STATE: &str = "STATE";
/// Serialized plan.
pub const PLAN: &str = "PLAN";
/// Serialized parameter set.
pub const PARAMETERS: &str = "PARAMETERS";
/// Free-form text.
pub const STRING: &str = "STRING";

/// Every well-known keyword.
pub const ALL: [&str; 4] = [STATE, PLAN, PARAMETERS, STRING];

pub fn is_well_known(keyword: &str) -> bool {
    ALL.contains(&keyword)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_well_known_keywords() {
        assert!(is_well_known("PLAN"));
        assert!(is_well_known(STRING));
        assert!(!is_well_known("plan"));
        assert!(!is_well_known("TELEMETRY"));
    }
}
