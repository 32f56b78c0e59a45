//! Unsolicited server messages delivered by [`crate::Client::next_update`].

use strata_tl_types::{Deserializable, deserialize, name_for_id};

/// A message that answered none of our requests.
///
/// The body is kept raw; callers decode it with [`Update::decode`] once
/// they know what to expect from [`Update::name`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Update {
    pub msg_id: i64,
    pub constructor_id: u32,
    pub body: Vec<u8>,
}

impl Update {
    /// Schema name of the constructor, e.g. `"updates.state"`.
    pub fn name(&self) -> Option<&'static str> {
        name_for_id(self.constructor_id)
    }

    pub fn decode<T: Deserializable>(&self) -> Result<T, deserialize::Error> {
        T::from_bytes(&self.body)
    }
}
