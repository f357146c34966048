use std::collections::HashMap;

/// Composite key for ingredient aggregation and pantry lookup.
///
/// The name is trimmed and lowercased; the unit is kept exactly as given.
/// "Tomato"/"cup" and "tomato"/"cup" collapse to one key, but "g" and "G"
/// stay distinct. No unit conversion happens at this level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IngredientKey {
    pub name: String,
    pub unit: String,
}

impl IngredientKey {
    #[must_use]
    pub fn new(name: &str, unit: &str) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            unit: unit.to_string(),
        }
    }
}

/// Accumulated demand for one (name, unit) key. Keeps the display casing of
/// the first line seen for that key.
#[derive(Debug, Clone, PartialEq)]
pub struct Demand {
    pub name: String,
    pub unit: String,
    pub quantity: f64,
}

/// Insertion-order-preserving map from ingredient key to accumulated demand.
///
/// A plain `HashMap` would make the generated list order depend on hashing;
/// keeping a side vector makes output order a function of input order only,
/// and content a function of the input multiset only.
#[derive(Debug, Default)]
pub struct AggregateMap {
    entries: Vec<Demand>,
    index: HashMap<IngredientKey, usize>,
}

impl AggregateMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one ingredient line. Same-key lines sum quantities; a new key
    /// inserts a fresh entry preserving this line's name and unit casing.
    pub fn add(&mut self, name: &str, quantity: f64, unit: &str) {
        let qty = if quantity.is_finite() { quantity } else { 0.0 };
        let key = IngredientKey::new(name, unit);
        if let Some(&i) = self.index.get(&key) {
            self.entries[i].quantity += qty;
        } else {
            self.index.insert(key, self.entries.len());
            self.entries.push(Demand {
                name: name.trim().to_string(),
                unit: unit.to_string(),
                quantity: qty,
            });
        }
    }

    #[must_use]
    pub fn get(&self, key: &IngredientKey) -> Option<&Demand> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Demand> {
        self.entries.iter()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Demand> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a AggregateMap {
    type Item = &'a Demand;
    type IntoIter = std::slice::Iter<'a, Demand>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Merge ingredient lines from any number of recipes into aggregated demand.
/// Pure function: same multiset of lines in, same map content out.
pub fn aggregate_lines<'a, I>(lines: I) -> AggregateMap
where
    I: IntoIterator<Item = (&'a str, f64, &'a str)>,
{
    let mut map = AggregateMap::new();
    for (name, quantity, unit) in lines {
        map.add(name, quantity, unit);
    }
    map
}
