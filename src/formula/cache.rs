//! Parsed-AST cache.
//!
//! Each distinct (expression text, formula version) pair is parsed once and
//! shared as an immutable `Arc<Expr>` across calculations and threads.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::ast::Expr;
use super::parser::parse;
use crate::error::EngineResult;

type CacheKey = (String, u32);

/// A thread-safe cache of parsed formulas.
#[derive(Debug, Default)]
pub struct FormulaCache {
    entries: RwLock<HashMap<CacheKey, Arc<Expr>>>,
}

impl FormulaCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached AST for the expression, parsing it on first use.
    ///
    /// Parse failures are not cached.
    pub fn get_or_parse(&self, expression: &str, version: u32) -> EngineResult<Arc<Expr>> {
        let key = (expression.to_string(), version);
        if let Some(ast) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(ast));
        }

        let ast = Arc::new(parse(expression)?);
        debug!(version, "Parsed formula into cache");
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(entries.entry(key).or_insert(ast)))
    }

    /// Drops the cached AST for an expression version.
    pub fn invalidate(&self, expression: &str, version: u32) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(expression.to_string(), version));
    }

    /// Returns the number of cached ASTs.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
