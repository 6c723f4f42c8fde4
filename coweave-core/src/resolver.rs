use coweave_crypto::CryptoProvider;
use coweave_types::RawCoId;

use crate::covalue::CoValueCore;
use crate::identity::Controller;

/// Access to the other cores of a table during validation and
/// materialization.
///
/// Content of an owned value depends on its group, and decrypting a sealed
/// read key depends on the sender's account, so both paths look cores up
/// through this trait instead of holding references to each other.
pub trait CoValueResolver {
    fn core(&self, id: &RawCoId) -> Option<&CoValueCore>;

    fn crypto(&self) -> &dyn CryptoProvider;

    /// The identity whose keys are used to decrypt. `None` reads only
    /// trusting content.
    fn controller(&self) -> Option<&Controller>;
}
