//! Ordered header parameter chain (`;branch=...;received=...;rport`)
//!
//! Parameters keep their wire order. Names compare case-insensitively.
//! A parameter may carry no value (`;rport`, `;lr`).

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub value: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.name, value),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamChain {
    params: Vec<Param>,
}

impl ParamChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `a=1;b;c=3`. A leading `;` is accepted, empty segments skipped.
    pub fn parse(raw: &str) -> Self {
        let params = raw
            .split(';')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment.split_once('=') {
                Some((name, value)) => Param::new(name.trim(), Some(value.trim().to_string())),
                None => Param::new(segment, None),
            })
            .collect();

        Self { params }
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params
            .iter()
            .find(|param| param.name.eq_ignore_ascii_case(name))
    }

    /// Value of `name`, `None` when absent or valueless
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|param| param.value.as_deref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace the value in place, or append when absent
    pub fn set(&mut self, name: &str, value: Option<String>) {
        match self
            .params
            .iter_mut()
            .find(|param| param.name.eq_ignore_ascii_case(name))
        {
            Some(param) => param.value = value,
            None => self.params.push(Param::new(name, value)),
        }
    }

    /// Append without looking for an existing entry
    pub fn push(&mut self, name: impl Into<String>, value: Option<String>) {
        self.params.push(Param::new(name, value));
    }

    pub fn remove(&mut self, name: &str) -> Option<Param> {
        let index = self
            .params
            .iter()
            .position(|param| param.name.eq_ignore_ascii_case(name))?;
        Some(self.params.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Renders as `;a=1;b`, or nothing for an empty chain
impl fmt::Display for ParamChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for param in &self.params {
            write!(f, ";{}", param)?;
        }
        Ok(())
    }
}
