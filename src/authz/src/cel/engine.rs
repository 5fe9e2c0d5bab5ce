//! CEL expression engine with compiled program caching

use cel_interpreter::extractors::{Arguments, This};
use cel_interpreter::{Context, ExecutionError, Program};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cel::{
    context::Bindings,
    convert::{arg_as_str, to_cel, to_outcome, MatcherOutcome},
    error::{CelError, Result},
    functions::FunctionMap,
};

/// Role reachability predicate exposed to matchers as `g(name1, name2[, domain])`
pub type RelationFn = Arc<dyn Fn(&str, &str, Option<&str>) -> Result<bool> + Send + Sync>;

/// Relation key (`g`, `g2`, ...) to reachability predicate
pub type RelationMap = HashMap<String, RelationFn>;

/// CEL engine for compiling and evaluating matcher expressions
pub struct Engine {
    /// Compiled program cache (thread-safe)
    program_cache: Arc<DashMap<String, Arc<Program>>>,

    /// Whether compiled programs are kept between calls
    cache_enabled: bool,
}

impl Engine {
    /// Create a new CEL engine with program caching enabled
    pub fn new() -> Self {
        Self::with_cache(true)
    }

    /// Create a new CEL engine, optionally without program caching
    pub fn with_cache(cache_enabled: bool) -> Self {
        Self {
            program_cache: Arc::new(DashMap::new()),
            cache_enabled,
        }
    }

    /// Compile a CEL expression and cache the result
    ///
    /// # Errors
    /// Returns error if expression cannot be compiled
    pub fn compile(&self, expr: &str) -> Result<Arc<Program>> {
        if let Some(prog) = self.program_cache.get(expr) {
            return Ok(prog.clone());
        }

        let program = Program::compile(expr)
            .map_err(|e| CelError::CompilationError(format!("{:?}", e)))?;

        let arc_program = Arc::new(program);
        if self.cache_enabled {
            self.program_cache.insert(expr.to_string(), arc_program.clone());
        }

        Ok(arc_program)
    }

    /// Build an evaluation context carrying the function namespace
    ///
    /// Every entry of `functions` is callable as `name(a, b)` or `a.name(b)`;
    /// every entry of `relations` as `name(a, b)` or `name(a, b, domain)`.
    pub fn build_context(&self, functions: &FunctionMap, relations: &RelationMap) -> Context {
        let mut context = Context::default();

        for (name, function) in functions.iter() {
            let function = Arc::clone(function);
            let fname = name.clone();
            context.add_function(
                name.as_str(),
                move |This(key1): This<Arc<String>>, key2: Arc<String>| -> std::result::Result<bool, ExecutionError> {
                    function(key1.as_str(), key2.as_str())
                        .map_err(|e| ExecutionError::function_error(fname.as_str(), &e.to_string()))
                },
            );
        }

        for (name, relation) in relations {
            let relation = Arc::clone(relation);
            let fname = name.clone();
            context.add_function(
                name.as_str(),
                move |Arguments(args): Arguments| -> std::result::Result<bool, ExecutionError> {
                    call_relation(&fname, &*relation, &args)
                        .map_err(|e| ExecutionError::function_error(fname.as_str(), &e.to_string()))
                },
            );
        }

        context
    }

    /// Bind variables into `context` and run a compiled program
    ///
    /// # Errors
    /// Returns error if evaluation fails or the result is neither boolean nor numeric
    pub fn execute(
        &self,
        program: &Program,
        context: &mut Context,
        bindings: &Bindings,
    ) -> Result<MatcherOutcome> {
        for (name, value) in bindings.iter() {
            context.add_variable_from_value(name.clone(), to_cel(value));
        }

        let result = program
            .execute(context)
            .map_err(|e| CelError::EvaluationError(format!("{:?}", e)))?;

        to_outcome(&result)
    }

    /// Compile and evaluate an expression in one call
    ///
    /// `expr` must already use flattened variable names (`r_sub`, not `r.sub`).
    pub fn evaluate(
        &self,
        expr: &str,
        bindings: &Bindings,
        functions: &FunctionMap,
    ) -> Result<MatcherOutcome> {
        let program = self.compile(expr)?;
        let mut context = self.build_context(functions, &RelationMap::new());
        self.execute(&program, &mut context, bindings)
    }

    /// Clear the compiled program cache
    pub fn clear_cache(&self) {
        self.program_cache.clear();
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            size: self.program_cache.len(),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn call_relation(
    name: &str,
    relation: &(dyn Fn(&str, &str, Option<&str>) -> Result<bool> + Send + Sync),
    args: &[cel_interpreter::Value],
) -> Result<bool> {
    match args {
        [name1, name2] => relation(arg_as_str(name, name1)?, arg_as_str(name, name2)?, None),
        [name1, name2, domain] => relation(
            arg_as_str(name, name1)?,
            arg_as_str(name, name2)?,
            Some(arg_as_str(name, domain)?),
        ),
        _ => Err(CelError::function(
            name,
            format!("expects 2 or 3 arguments, got {}", args.len()),
        )),
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cached programs
    pub size: usize,
}
