use bincode::{Decode, Encode};

use crate::{Params, Value};

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct Request {
    pub name: String,
    pub params: Params,
}

impl Request {
    pub fn new(name: impl Into<String>, params: Params) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}
