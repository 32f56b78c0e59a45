/// Which section of the schema a [`super::Definition`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// Data constructors (`---types---`, the default section).
    Types,
    /// RPC functions (`---functions---`).
    Functions,
}
