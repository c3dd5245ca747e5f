pub mod relay_error;

pub use relay_error::{BUSY_CLIENT_ERROR, GENERIC_CLIENT_ERROR, RelayError, RelayResult};
