use serde::de::DeserializeOwned;
use serde::Serialize;

/// A value with a stable, unique string identity.
///
/// Identity is the id, not value equality: two records with the same id are
/// the same record as far as any store or manager is concerned. The id is
/// also the file stem the record is stored under.
pub trait Identifiable {
    /// The record's unique id.
    fn id(&self) -> &str;
}

/// A persistable record.
///
/// Records are encoded through serde, shared between readers as `Arc<Self>`
/// (hence `Send + Sync + 'static`), and can be constructed as a default
/// instance for a given id when a lookup misses.
pub trait Record: Identifiable + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Build the default instance for `id`.
    ///
    /// The returned value must report `id` from [`Identifiable::id`].
    fn construct(id: &str) -> Self;
}

impl<T: Identifiable + ?Sized> Identifiable for std::sync::Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }
}

impl<T: Identifiable + ?Sized> Identifiable for Box<T> {
    fn id(&self) -> &str {
        (**self).id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Serialize, Deserialize)]
    struct Person {
        id: String,
        age: u32,
    }

    impl Identifiable for Person {
        fn id(&self) -> &str {
            &self.id
        }
    }

    impl Record for Person {
        fn construct(id: &str) -> Self {
            Self { id: id.to_string(), age: 0 }
        }
    }

    #[test]
    fn construct_keeps_the_id() {
        let p = Person::construct("johnny_rockets");
        assert_eq!(p.id(), "johnny_rockets");
        assert_eq!(p.age, 0);
    }

    #[test]
    fn shared_records_forward_identity() {
        let p = Arc::new(Person { id: "a".into(), age: 3 });
        assert_eq!(Identifiable::id(&p), "a");
        let boxed = Box::new(Person { id: "b".into(), age: 4 });
        assert_eq!(Identifiable::id(&boxed), "b");
    }

    #[test]
    fn records_encode_through_serde() {
        let p = Person { id: "c".into(), age: 30 };
        let json = serde_json::to_string(&p).unwrap();
        let back: Person = serde_json::from_str(&json).unwrap();
        assert_eq!(back.age, 30);
    }
}
