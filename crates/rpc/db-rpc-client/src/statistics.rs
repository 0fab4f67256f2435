// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use db_rpc_common::Value;
use std::sync::Arc;

/// The ordered field names of a statistics snapshot. Built once per client from the first reply
/// and shared by every `Statistics` that client hands out afterwards.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StatisticsShape {
    fields: Arc<[String]>,
}

impl StatisticsShape {
    pub fn new(fields: impl IntoIterator<Item = String>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    /// True if both shapes are literally the same allocation, i.e. came from the same client.
    pub fn shares_storage_with(&self, other: &StatisticsShape) -> bool {
        Arc::ptr_eq(&self.fields, &other.fields)
    }
}

/// One statistics snapshot: a value per field of its shape, in shape order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Statistics {
    shape: StatisticsShape,
    values: Vec<Value>,
}

impl Statistics {
    pub(crate) fn new(shape: StatisticsShape, values: Vec<Value>) -> Self {
        Self { shape, values }
    }

    pub fn shape(&self) -> &StatisticsShape {
        &self.shape
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.shape.index_of(field).and_then(|i| self.values.get(i))
    }

    pub fn get_int(&self, field: &str) -> Option<i64> {
        match self.get(field) {
            Some(Value::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.shape
            .fields()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
