//! Concept registry services
//!
//! Governed concept storage, standard packs, term resolution and naming variants.

pub mod aliases;
pub mod concepts;
pub mod governance;
pub mod naming;
pub mod standard_packs;

pub use aliases::AliasResolver;
pub use concepts::ConceptStore;
pub use naming::NamingVariantResolver;
pub use standard_packs::{builtin_packs, StandardPackRegistry};
