// Shared id types.
//
// Token ids are `u32` in memory even though they are stored as 16-bit
// integers on disk; the record store does the narrowing and reports ids that
// do not fit.

/// A vocabulary id: either a base token or a composite created by a merge.
pub type TokenId = u32;

/// Two adjacent token ids, left then right.
pub type TokenPair = (TokenId, TokenId);

/// One entry of a merge list: the pair that was merged and the id it became.
///
/// Serializes as `[[left, right], id]`, which is the persisted merge-tree
/// layout.
pub type Merge = (TokenPair, TokenId);

/// Largest vocabulary the 16-bit record format can address.
pub const MAX_VOCAB_SIZE: usize = 1 << 16;
