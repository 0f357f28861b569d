/// A row that can live inside a collection entry. The id is the unit of identity within one
/// array key; uniqueness is expected but not enforced by the cache.
pub trait Record {
    fn id(&self) -> &str;
}
