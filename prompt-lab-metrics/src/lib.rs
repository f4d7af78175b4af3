pub mod normalize;
pub mod calculators;
pub mod aggregators;
pub mod statistical;
pub mod summary;
pub mod comparison;

pub use normalize::*;
pub use calculators::*;
pub use aggregators::*;
pub use statistical::*;
pub use summary::*;
pub use comparison::*;
