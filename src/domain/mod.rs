mod allocation;
mod interval;
mod issue;
mod money;
mod record;
mod summary;
mod trace;

pub use allocation::*;
pub use interval::*;
pub use issue::*;
pub use money::*;
pub use record::*;
pub use summary::*;
pub use trace::*;
