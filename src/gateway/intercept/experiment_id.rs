//! Usage: Random experiment-id values (breaks cross-request correlation).

use rand::distributions::Alphanumeric;
use rand::Rng;

pub(crate) const EXPERIMENT_ID_LEN: usize = 22;

pub(crate) fn generate_experiment_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(EXPERIMENT_ID_LEN)
        .map(char::from)
        .collect()
}
