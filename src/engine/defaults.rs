use crate::domain::{CaseRecord, DefaultValueRecord};

/// Copies every default whose key the case leaves unset. Runs before skip
/// evaluation so a defaulted `skipTest` takes part in it.
pub fn apply_defaults(case: &mut CaseRecord, defaults: &DefaultValueRecord) {
    for (key, value) in defaults.iter() {
        if !case.is_set(key) {
            case.set(key, value.clone());
        }
    }
}
