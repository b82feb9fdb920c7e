pub use super::{coordinator::*, worker::*};

pub use serial_test::serial;
pub use tracing::*;
