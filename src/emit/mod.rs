//! Source emitters for external modeling languages.
//!
//! Each emitter renders the mass balances of a network into a complete,
//! embeddable block of another language. Emitters share the balance terms of
//! [`crate::balance`] and the rendering of [`crate::expr::Expr::render`]; they
//! differ only in their [`TargetProfile`] and boilerplate. The emitted text is
//! never executed or checked here.

use crate::dictionary::TargetProfile;
use crate::errors::ModelError;
use crate::model::ReactionNetwork;

pub mod antimony;
pub mod stan;

pub use antimony::{AntimonyEmitter, AntimonyOptions};
pub use stan::{StanEmitter, StanModel, StanOptions};

/// A code generator for one output language.
pub trait Emitter {
    /// Rendering convention of the target.
    fn profile(&self) -> TargetProfile;

    /// Renders the network as source text.
    fn emit(&self, network: &ReactionNetwork) -> Result<String, ModelError>;
}
