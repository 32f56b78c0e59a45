/// The `flags.N` guard of an optional parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Flag {
    /// The `#` field holding the bit, usually `flags`.
    pub name: String,
    /// Bit index, `0..32`.
    pub index: u32,
}
