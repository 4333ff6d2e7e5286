/// Ordered table of the fields the engine extracts from each input record:
/// the declared key fields plus every field some aggregator observes.
/// Indices into this table identify fields everywhere downstream, so the
/// table is frozen with `finalize` before any record is parsed.
#[derive(Debug, Default)]
pub struct FieldTable {
    fields: Vec<InterestingField>,
    num_keys: usize,
}

#[derive(Debug)]
struct InterestingField {
    name: String,
    is_key: bool,
}

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a field, returning the index of the existing entry when the
    /// name is already present. A field first seen as an aggregator input
    /// is promoted to a key if later declared as one.
    pub fn add(&mut self, name: &str, is_key: bool) -> usize {
        if let Some(pos) = self.fields.iter().position(|f| f.name == name) {
            if is_key {
                self.fields[pos].is_key = true;
            }
            return pos;
        }
        self.fields.push(InterestingField {
            name: name.to_string(),
            is_key,
        });
        self.fields.len() - 1
    }

    /// Reorders the table so key fields come first, preserving declaration
    /// order within each partition. Callers re-resolve indices by name
    /// afterwards.
    pub fn finalize(&mut self) {
        self.fields.sort_by_key(|f| !f.is_key);
        self.num_keys = self.fields.iter().filter(|f| f.is_key).count();
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn num_key_fields(&self) -> usize {
        self.num_keys
    }

    pub fn name(&self, index: usize) -> &str {
        &self.fields[index].name
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::FieldTable;

    #[test]
    fn add_deduplicates_by_name() {
        let mut table = FieldTable::new();
        assert_eq!(table.add("x", true), 0);
        assert_eq!(table.add("y", false), 1);
        assert_eq!(table.add("x", false), 0);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn add_promotes_to_key() {
        let mut table = FieldTable::new();
        table.add("profit", false);
        table.add("profit", true);
        table.finalize();
        assert_eq!(table.num_key_fields(), 1);
    }

    #[test]
    fn finalize_partitions_keys_first() {
        let mut table = FieldTable::new();
        table.add("amount", false);
        table.add("date", true);
        table.add("hour", true);
        table.add("price", false);
        table.finalize();
        assert_eq!(table.num_key_fields(), 2);
        let names: Vec<_> = table.names().collect();
        assert_eq!(names, vec!["date", "hour", "amount", "price"]);
        assert_eq!(table.index_of("amount"), Some(2));
        assert_eq!(table.index_of("missing"), None);
    }
}
