pub mod flatten;
pub mod table;

pub use flatten::{flatten_into, flatten_object};
pub use table::{Row, Table};
