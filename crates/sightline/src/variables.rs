use facet::Facet;
use facet_value::Value;
use sightline_types::ValueMap;

/// Named values handed to a capture call.
///
/// Keys are kept in sorted order, which is also the order scanning and
/// serialization see them in.
#[derive(Debug, Clone, Default)]
pub struct Variables(ValueMap);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds any `Facet` value. A value that cannot be converted is recorded
    /// as a `"[<type>]"` placeholder instead.
    pub fn with_facet<T>(mut self, name: impl Into<String>, value: &T) -> Self
    where
        T: for<'facet> Facet<'facet>,
    {
        self.insert_facet(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn insert_facet<T>(&mut self, name: impl Into<String>, value: &T)
    where
        T: for<'facet> Facet<'facet>,
    {
        let value = match facet_value::to_value(value) {
            Ok(value) => value,
            Err(_) => format!("[{}]", std::any::type_name::<T>()).into(),
        };
        self.0.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &ValueMap {
        &self.0
    }

    pub fn into_map(self) -> ValueMap {
        self.0
    }
}

impl From<ValueMap> for Variables {
    fn from(map: ValueMap) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Facet)]
    struct Order {
        id: u64,
        currency: String,
    }

    fn json(value: &Value) -> String {
        facet_json::to_string(value).expect("encode value")
    }

    #[test]
    fn scalars_convert_directly() {
        let vars = Variables::new()
            .with("amount", 10_i64)
            .with("ratio", 0.5_f64)
            .with("currency", "EUR".to_string());
        assert_eq!(vars.len(), 3);
        assert_eq!(json(&vars.as_map()["amount"]), "10");
        assert_eq!(json(&vars.as_map()["currency"]), "\"EUR\"");
    }

    #[test]
    fn facet_values_become_objects() {
        let order = Order {
            id: 7,
            currency: "EUR".into(),
        };
        let vars = Variables::new().with_facet("order", &order);
        assert_eq!(json(&vars.as_map()["order"]), r#"{"id":7,"currency":"EUR"}"#);
    }

    #[test]
    fn keys_iterate_sorted() {
        let vars: Variables = [("b", 1_i64), ("a", 2_i64)].into_iter().collect();
        let keys: Vec<&String> = vars.as_map().keys().collect();
        assert_eq!(keys, ["a", "b"]);
    }
}
