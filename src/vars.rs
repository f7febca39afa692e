// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::UnboundVariable;

/// Values bound by the statements of one test case.
///
/// Names are case-insensitive and stored uppercased. A store is created empty
/// for each test case and dropped when the case finishes. Iteration and the
/// JSON rendering are ordered by name, not by binding order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableStore {
    vars: BTreeMap<String, String>,
}

impl VariableStore {
    pub fn new() -> VariableStore {
        VariableStore::default()
    }

    /// Binds `name` to `value`, replacing any earlier binding.
    pub fn bind(&mut self, name: &str, value: String) {
        self.vars.insert(name.to_uppercase(), value);
    }

    /// Looks up the value bound to `name`.
    pub fn get(&self, name: &str) -> Result<&str, UnboundVariable> {
        let name = name.to_uppercase();
        match self.vars.get(&name) {
            Some(value) => Ok(value),
            None => Err(UnboundVariable { name }),
        }
    }

    /// Looks up each of `names`, in order.
    pub fn resolve<S>(&self, names: &[S]) -> Result<Vec<String>, UnboundVariable>
    where
        S: AsRef<str>,
    {
        names
            .iter()
            .map(|name| self.get(name.as_ref()).map(str::to_owned))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for VariableStore {
    /// Renders the store as a JSON object.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let json = serde_json::to_string(&self.vars).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
