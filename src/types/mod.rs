pub mod link;
pub mod node;
pub mod pattern;
pub mod species;
pub mod types;

pub use link::Link;
pub use node::{Node, Source, Tank};
pub use pattern::Pattern;
pub use species::{Constant, Parameter, Reaction, Species, TankReaction, Term};
pub use types::*;
