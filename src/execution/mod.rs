pub mod result;
pub mod session;

pub use result::{CellValue, TabularResult};
pub use session::{ExecutionError, QuerySession, SessionProvider};
