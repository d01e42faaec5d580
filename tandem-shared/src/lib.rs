pub mod money;
pub mod pii;

pub use money::{Cents, BasisPoints};
pub use pii::Masked;
