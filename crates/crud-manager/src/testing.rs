use crud_types::{Identifiable, Record};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub age: u32,
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

pub fn person(id: &str, age: u32) -> Person {
    Person { id: id.to_string(), age }
}
