//! The back emitter: lowers the IR to kernel expressions under the
//! `[envFunctions, arguments]` environment discipline.
//!
//! Every declaration block (a module, or a let block) is planned as a pool of
//! environment entries: the partial-application trampoline, the entries
//! carried over from the enclosing block, the block's own declarations in
//! recursion-domain order, the imported functions the block touches, and the
//! closure captures. A declaration's environment contract is the pool of its
//! defining block; callers project a callee's contract out of their own
//! environment, which always contains it.

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::domains::{
    declaration_dependencies, reachable_from, recursion_domains, transitive_closures,
};
use crate::errors::{CompileError, ResultContext};
use crate::ir::{Deconstruction, Expr as IrExpr, FunctionParameter};
use crate::kernel::{Expr, FUNCTION_TAG, Value, encode, evaluate};
use crate::reduce::reduce;
use crate::routines::{
    PARTIAL_APPLICATION_NAME, PARTIAL_APPLICATION_VALUE, function_record_value,
    parse_function_record,
};

/// Where a declaration expects its environment to come from when called.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedEnvironment {
    /// The callee's `envFunctions` is the named contract, projected from the
    /// caller's environment slot by slot.
    Local { expected_declarations: Vec<String> },
    /// The callee is a closed function record reachable from the caller's
    /// environment through this deconstruction path; its environment travels
    /// inside the record.
    Imported { path_to_record: Vec<Deconstruction> },
    /// The slot holds a plain value: a closure capture or a lifted value
    /// binding. No call environment is involved.
    Independent,
}

/// One slot of an emitted environment-functions list.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvFnEntry {
    pub name: String,
    pub parameter_count: usize,
    pub expected_environment: ExpectedEnvironment,
}

/// The emitter's per-expression context.
#[derive(Debug, Clone, Default)]
pub struct EmitStack {
    /// Closed values for functions of already-compiled modules (and prior
    /// interactive declarations), keyed by the name the IR references.
    pub imported_functions: AHashMap<String, Value>,
    /// The environment-functions pool of the current block, in slot order.
    pub environment_functions: Vec<EnvFnEntry>,
    /// Parameter bindings of the current declaration: deconstruction paths
    /// from the environment root.
    pub environment_deconstructions: AHashMap<String, Vec<Deconstruction>>,
}

impl EmitStack {
    fn entry_index(&self, name: &str) -> Option<usize> {
        self.environment_functions
            .iter()
            .position(|entry| entry.name == name)
    }

    fn pool_names(&self) -> Vec<String> {
        self.environment_functions
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }
}

fn env_functions_expr() -> Expr {
    Expr::item(0, Expr::Environment)
}

/// How a pool slot's runtime value is produced in the enclosing context.
#[derive(Debug, Clone)]
enum SlotSource {
    /// The encoded trampoline constant.
    Trampoline,
    /// The encoded body of a block declaration.
    EncodedBody(String),
    /// Pass-through from the enclosing block's slot at this index.
    OuterSlot(usize),
    /// A closed imported value.
    ImportedValue(Value),
    /// An expression evaluated in the enclosing context when the block is
    /// entered: a captured parameter or a lifted value binding.
    Capture(IrExpr),
}

/// A planned declaration block: pool entries, how to fill each slot, and the
/// emitted bodies of the block's declarations.
struct BlockPlan {
    entries: Vec<EnvFnEntry>,
    slot_sources: Vec<SlotSource>,
    /// Emitted body expression and parameter count per kept declaration.
    bodies: IndexMap<String, (Expr, usize)>,
    /// Value declarations lifted into captures, with their emitted position
    /// in the pool.
    lifted: IndexMap<String, usize>,
}

impl BlockPlan {
    fn stack(&self, imported: &AHashMap<String, Value>) -> EmitStack {
        EmitStack {
            imported_functions: imported.clone(),
            environment_functions: self.entries.clone(),
            environment_deconstructions: AHashMap::new(),
        }
    }
}

fn contains_application(expr: &IrExpr) -> bool {
    match expr {
        IrExpr::Literal(_) | IrExpr::Reference(_) => false,
        IrExpr::Application { .. } => true,
        IrExpr::List(items) => items.iter().any(contains_application),
        IrExpr::KernelApplication { argument, .. } | IrExpr::KernelRoutine { argument, .. } => {
            contains_application(argument)
        }
        IrExpr::Conditional {
            condition,
            true_branch,
            false_branch,
        } => {
            contains_application(condition)
                || contains_application(true_branch)
                || contains_application(false_branch)
        }
        IrExpr::Function { body, .. } => contains_application(body),
        IrExpr::DeclarationBlock { declarations, body } => {
            declarations.values().any(contains_application) || contains_application(body)
        }
        IrExpr::StringTag { tagged, .. } => contains_application(tagged),
    }
}

/// Deconstruction paths for the parameters of a function: parameter `i`
/// starts at element `i` of the arguments list.
fn parameter_deconstructions(
    parameters: &[FunctionParameter],
) -> AHashMap<String, Vec<Deconstruction>> {
    let mut map = AHashMap::new();
    for (index, parameter) in parameters.iter().enumerate() {
        for (name, path) in parameter {
            let mut full = vec![Deconstruction::ListItem(1), Deconstruction::ListItem(index)];
            full.extend(path.iter().cloned());
            map.insert(name.clone(), full);
        }
    }
    map
}

/// Plans a declaration block against its enclosing context.
///
/// `roots` are the names that must stay reachable (a module's exposed set);
/// `body_free` are the free references of the block's own body expression
/// (empty for modules), already stripped of any parameter bindings.
fn plan_block(
    outer: &EmitStack,
    declarations: &IndexMap<String, IrExpr>,
    roots: &[String],
    body_free: &AHashSet<String>,
    body_has_application: bool,
) -> Result<BlockPlan, CompileError> {
    let dependencies = declaration_dependencies(declarations);
    let mut root_names: Vec<&str> = roots.iter().map(String::as_str).collect();
    root_names.extend(
        body_free
            .iter()
            .filter(|name| declarations.contains_key(*name))
            .map(String::as_str),
    );
    let reachable = reachable_from(&dependencies, root_names);
    let kept: IndexMap<String, IrExpr> = declarations
        .iter()
        .filter(|(name, _)| reachable.contains(*name))
        .map(|(name, expr)| (name.clone(), expr.clone()))
        .collect();

    let kept_dependencies = declaration_dependencies(&kept);
    let closures = transitive_closures(&kept_dependencies);

    // recursion through functions is legal; a value binding on a dependency
    // cycle is not evaluable
    for (name, expr) in &kept {
        if matches!(expr, IrExpr::Function { .. }) {
            continue;
        }
        if closures.get(name).is_some_and(|closure| closure.contains(name)) {
            let mut cycle: Vec<String> = closures[name.as_str()]
                .iter()
                .filter(|member| {
                    closures
                        .get(*member)
                        .is_some_and(|back| back.contains(name))
                })
                .cloned()
                .collect();
            cycle.sort();
            return Err(CompileError::DependencyCycle(cycle));
        }
    }

    // value bindings with no dependency on the block are lifted into
    // captures: they are evaluated once per block entry
    let mut lifted_names: Vec<String> = Vec::new();
    for (name, expr) in &kept {
        let is_value = !matches!(expr, IrExpr::Function { .. });
        if is_value && closures.get(name).is_none_or(|s| s.is_empty()) {
            lifted_names.push(name.clone());
        }
    }
    let remaining: IndexMap<String, IrExpr> = kept
        .iter()
        .filter(|(name, _)| !lifted_names.contains(*name))
        .map(|(name, expr)| (name.clone(), expr.clone()))
        .collect();

    // recursion-domain order over what stays in the pool
    let remaining_order: Vec<String> = remaining.keys().cloned().collect();
    let remaining_closures = {
        let deps = declaration_dependencies(&remaining);
        transitive_closures(&deps)
    };
    let domains = recursion_domains(&remaining_order, &remaining_closures);
    let emission_order: Vec<String> = domains.into_iter().flatten().collect();

    // names the block needs from outside itself
    let mut free_outside: AHashSet<String> = body_free
        .iter()
        .filter(|name| !kept.contains_key(*name))
        .cloned()
        .collect();
    for expr in kept.values() {
        for name in expr.free_references() {
            if !kept.contains_key(&name) {
                free_outside.insert(name);
            }
        }
    }

    let needs_trampoline = body_has_application
        || kept.values().any(contains_application)
        || outer.entry_index(PARTIAL_APPLICATION_NAME).is_some();

    let mut entries: Vec<EnvFnEntry> = Vec::new();
    let mut slot_sources: Vec<SlotSource> = Vec::new();

    let outer_has_trampoline = outer.entry_index(PARTIAL_APPLICATION_NAME).is_some();
    if needs_trampoline && !outer_has_trampoline {
        entries.push(EnvFnEntry {
            name: PARTIAL_APPLICATION_NAME.to_owned(),
            parameter_count: 2,
            expected_environment: ExpectedEnvironment::Independent,
        });
        slot_sources.push(SlotSource::Trampoline);
    }

    // carry the whole enclosing pool so any contract it mentions stays
    // projectable
    for (index, entry) in outer.environment_functions.iter().enumerate() {
        entries.push(entry.clone());
        slot_sources.push(SlotSource::OuterSlot(index));
    }

    for name in &emission_order {
        let parameter_count = match &remaining[name.as_str()] {
            IrExpr::Function { parameters, .. } => parameters.len(),
            _ => 0,
        };
        entries.push(EnvFnEntry {
            name: name.clone(),
            parameter_count,
            // the contract is filled in once the pool is complete
            expected_environment: ExpectedEnvironment::Local {
                expected_declarations: Vec::new(),
            },
        });
        slot_sources.push(SlotSource::EncodedBody(name.clone()));
    }

    // imported functions referenced anywhere in the block are routed through
    // the pool so their records are not re-embedded at every use site
    let mut imported_needed: Vec<String> = free_outside
        .iter()
        .filter(|name| {
            outer.entry_index(name).is_none()
                && outer.environment_deconstructions.get(*name).is_none()
                && outer.imported_functions.contains_key(*name)
        })
        .cloned()
        .collect();
    imported_needed.sort();
    for name in imported_needed {
        let value = outer.imported_functions[&name].clone();
        let parameter_count = parse_function_record(&value)
            .map(|(_, count, _, _)| count)
            .unwrap_or(0);
        entries.push(EnvFnEntry {
            name: name.clone(),
            parameter_count,
            expected_environment: ExpectedEnvironment::Imported {
                path_to_record: Vec::new(),
            },
        });
        slot_sources.push(SlotSource::ImportedValue(value));
    }

    // lifted value bindings, then captured parameters
    let mut lifted = IndexMap::new();
    for name in &lifted_names {
        lifted.insert(name.clone(), entries.len());
        entries.push(EnvFnEntry {
            name: name.clone(),
            parameter_count: 0,
            expected_environment: ExpectedEnvironment::Independent,
        });
        slot_sources.push(SlotSource::Capture(kept[name.as_str()].clone()));
    }
    let mut captured: Vec<String> = free_outside
        .iter()
        .filter(|name| outer.environment_deconstructions.contains_key(*name))
        .cloned()
        .collect();
    captured.sort();
    for name in captured {
        entries.push(EnvFnEntry {
            name: name.clone(),
            parameter_count: 0,
            expected_environment: ExpectedEnvironment::Independent,
        });
        slot_sources.push(SlotSource::Capture(IrExpr::Reference(name)));
    }

    // finalize contracts and imported paths now that slot positions are fixed
    let pool_names: Vec<String> = entries.iter().map(|entry| entry.name.clone()).collect();
    for (index, entry) in entries.iter_mut().enumerate() {
        match &mut entry.expected_environment {
            ExpectedEnvironment::Local { expected_declarations } => {
                if slot_sources
                    .get(index)
                    .is_some_and(|source| matches!(source, SlotSource::EncodedBody(_)))
                {
                    *expected_declarations = pool_names.clone();
                }
            }
            ExpectedEnvironment::Imported { path_to_record } => {
                *path_to_record =
                    vec![Deconstruction::ListItem(0), Deconstruction::ListItem(index)];
            }
            ExpectedEnvironment::Independent => {}
        }
    }

    let mut plan = BlockPlan {
        entries,
        slot_sources,
        bodies: IndexMap::new(),
        lifted,
    };

    // emit the kept declaration bodies under the block's own stack
    let block_stack = plan.stack(&outer.imported_functions);
    for name in &emission_order {
        let declaration = &remaining[name.as_str()];
        let (emitted, parameter_count) = match declaration {
            IrExpr::Function { parameters, body } => {
                let mut stack = block_stack.clone();
                stack.environment_deconstructions = parameter_deconstructions(parameters);
                let emitted = emit_expression(&stack, body)
                    .context(format!("Failed to compile function '{name}'"))?;
                (emitted, parameters.len())
            }
            other => {
                let emitted = emit_expression(&block_stack, other)
                    .context(format!("Failed to compile declaration '{name}'"))?;
                (emitted, 0)
            }
        };
        plan.bodies.insert(name.clone(), (reduce(emitted), parameter_count));
    }

    Ok(plan)
}

/// Builds the runtime environment-functions list of a planned block, in the
/// enclosing context.
fn slot_list_expr(outer: &EmitStack, plan: &BlockPlan) -> Result<Expr, CompileError> {
    let mut elements = Vec::with_capacity(plan.slot_sources.len());
    for source in &plan.slot_sources {
        let element = match source {
            SlotSource::Trampoline => Expr::lit(PARTIAL_APPLICATION_VALUE.clone()),
            SlotSource::EncodedBody(name) => {
                let (body, _) = plan
                    .bodies
                    .get(name)
                    .ok_or_else(|| CompileError::invariant(format!("no emitted body for '{name}'")))?;
                Expr::lit(encode(body))
            }
            SlotSource::OuterSlot(index) => Expr::item(*index, env_functions_expr()),
            SlotSource::ImportedValue(value) => Expr::lit(value.clone()),
            SlotSource::Capture(expr) => emit_expression(outer, expr)?,
        };
        elements.push(element);
    }
    Ok(Expr::List(elements))
}

/// Emits a whole module: every reachable declaration becomes a closed value.
/// Functions become `Function`-tagged closure records; value declarations
/// are evaluated once with the block's environment.
pub fn emit_module(
    declarations: &IndexMap<String, IrExpr>,
    exposed: &[String],
    imported_functions: &AHashMap<String, Value>,
) -> Result<IndexMap<String, Value>, CompileError> {
    let outer = EmitStack {
        imported_functions: imported_functions.clone(),
        ..EmitStack::default()
    };
    let plan = plan_block(&outer, declarations, exposed, &AHashSet::new(), false)?;

    // at module level every slot is a closed value
    let mut slot_values = Vec::with_capacity(plan.slot_sources.len());
    for source in &plan.slot_sources {
        let value = match source {
            SlotSource::Trampoline => PARTIAL_APPLICATION_VALUE.clone(),
            SlotSource::EncodedBody(name) => encode(&plan.bodies[name.as_str()].0),
            SlotSource::ImportedValue(value) => value.clone(),
            SlotSource::Capture(expr) => {
                let emitted = emit_expression(&outer, expr)?;
                evaluate(&Value::empty_list(), &emitted).map_err(|error| {
                    CompileError::invariant(format!(
                        "failed to evaluate module-level value binding: {error}"
                    ))
                })?
            }
            SlotSource::OuterSlot(_) => {
                return Err(CompileError::invariant(
                    "module block cannot inherit environment slots",
                ));
            }
        };
        slot_values.push(value);
    }

    let mut results = IndexMap::new();
    for (name, (body, parameter_count)) in &plan.bodies {
        if *parameter_count > 0 {
            results.insert(
                name.clone(),
                function_record_value(encode(body), *parameter_count, slot_values.clone()),
            );
            continue;
        }
        let environment = Value::List(vec![
            Value::List(slot_values.clone()),
            Value::empty_list(),
        ]);
        let value = evaluate(&environment, body).map_err(|error| {
            CompileError::invariant(format!("failed to evaluate declaration '{name}': {error}"))
        })?;
        results.insert(name.clone(), value);
    }
    for (name, slot_index) in &plan.lifted {
        results.insert(name.clone(), slot_values[*slot_index].clone());
    }
    Ok(results)
}

/// The emitted parts of an anonymous function, before assembly into either a
/// closure record or an immediate application.
struct ClosureParts {
    inner: Expr,
    env_list: Expr,
    parameter_count: usize,
}

fn emit_closure(
    outer: &EmitStack,
    parameters: &[FunctionParameter],
    body: &IrExpr,
) -> Result<ClosureParts, CompileError> {
    let parameter_names: AHashSet<String> = parameters
        .iter()
        .flat_map(|parameter| parameter.iter().map(|(name, _)| name.clone()))
        .collect();
    let body_free: AHashSet<String> = body
        .free_references()
        .into_iter()
        .filter(|name| !parameter_names.contains(name))
        .collect();
    let plan = plan_block(
        outer,
        &IndexMap::new(),
        &[],
        &body_free,
        contains_application(body),
    )?;
    let mut stack = plan.stack(&outer.imported_functions);
    stack.environment_deconstructions = parameter_deconstructions(parameters);
    let inner = reduce(emit_expression(&stack, body)?);
    let env_list = slot_list_expr(outer, &plan)?;
    Ok(ClosureParts {
        inner,
        env_list,
        parameter_count: parameters.len(),
    })
}

/// Emits an IR expression to a kernel expression under the given stack.
pub fn emit_expression(stack: &EmitStack, expr: &IrExpr) -> Result<Expr, CompileError> {
    match expr {
        IrExpr::Literal(value) => Ok(Expr::lit(value.clone())),
        IrExpr::List(items) => Ok(Expr::List(
            items
                .iter()
                .map(|item| emit_expression(stack, item))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        IrExpr::KernelApplication { function, argument } => Ok(Expr::KernelFunction {
            function: *function,
            argument: Box::new(emit_expression(stack, argument)?),
        }),
        IrExpr::Conditional {
            condition,
            true_branch,
            false_branch,
        } => Ok(Expr::conditional(
            emit_expression(stack, condition)?,
            emit_expression(stack, true_branch)?,
            emit_expression(stack, false_branch)?,
        )),
        IrExpr::StringTag { tag, tagged } => Ok(Expr::StringTag {
            tag: tag.clone(),
            tagged: Box::new(emit_expression(stack, tagged)?),
        }),
        IrExpr::Reference(name) => resolve_reference(stack, name),
        IrExpr::KernelRoutine { routine, argument } => {
            let encoded = Expr::lit(encode(routine));
            let arguments = emit_expression(stack, argument)?;
            Ok(Expr::parse_and_eval(
                encoded,
                Expr::List(vec![Expr::List(Vec::new()), arguments]),
            ))
        }
        IrExpr::Function { parameters, body } => {
            let parts = emit_closure(stack, parameters, body)?;
            Ok(closure_record_expr(&parts))
        }
        IrExpr::Application { function, arguments } => {
            emit_application(stack, function, arguments)
        }
        IrExpr::DeclarationBlock { declarations, body } => {
            emit_declaration_block(stack, declarations, body)
        }
    }
}

fn closure_record_expr(parts: &ClosureParts) -> Expr {
    Expr::List(vec![
        Expr::lit(Value::name(FUNCTION_TAG)),
        Expr::List(vec![
            Expr::lit(encode(&parts.inner)),
            Expr::lit(Value::from_i64(parts.parameter_count as i64)),
            parts.env_list.clone(),
            Expr::List(Vec::new()),
        ]),
    ])
}

fn emit_declaration_block(
    stack: &EmitStack,
    declarations: &IndexMap<String, IrExpr>,
    body: &IrExpr,
) -> Result<Expr, CompileError> {
    let body_free = body.free_references();
    let plan = plan_block(
        stack,
        declarations,
        &[],
        &body_free,
        contains_application(body),
    )?;
    let block_stack = plan.stack(&stack.imported_functions);
    let emitted_body = reduce(emit_expression(&block_stack, body)?);
    let env_list = slot_list_expr(stack, &plan)?;
    Ok(Expr::parse_and_eval(
        Expr::lit(encode(&emitted_body)),
        Expr::List(vec![env_list, Expr::List(Vec::new())]),
    ))
}

/// Projects a callee's environment contract out of the current environment.
fn contract_projection(stack: &EmitStack, expected: &[String]) -> Result<Expr, CompileError> {
    let pool = stack.pool_names();
    if pool == expected {
        return Ok(env_functions_expr());
    }
    let elements = expected
        .iter()
        .map(|name| {
            stack
                .entry_index(name)
                .map(|index| Expr::item(index, env_functions_expr()))
                .ok_or_else(|| {
                    CompileError::invariant(format!(
                        "environment contract entry '{name}' is not available in the current pool"
                    ))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Expr::List(elements))
}

/// The trampoline as an expression: the pool slot when present, the encoded
/// constant otherwise.
fn trampoline_expr(stack: &EmitStack) -> Expr {
    match stack.entry_index(PARTIAL_APPLICATION_NAME) {
        Some(index) => Expr::item(index, env_functions_expr()),
        None => Expr::lit(PARTIAL_APPLICATION_VALUE.clone()),
    }
}

/// A call through the trampoline, applying `arguments` one by one.
fn trampoline_call(stack: &EmitStack, function: Expr, arguments: Vec<Expr>) -> Expr {
    let trampoline = trampoline_expr(stack);
    Expr::parse_and_eval(
        trampoline.clone(),
        Expr::List(vec![
            Expr::List(vec![trampoline]),
            Expr::List(vec![function, Expr::List(arguments)]),
        ]),
    )
}

/// Resolves a reference to an expression producing its value. Resolution
/// priority: parameter deconstructions, then environment slots, then
/// imported functions.
fn resolve_reference(stack: &EmitStack, name: &str) -> Result<Expr, CompileError> {
    if let Some(path) = stack.environment_deconstructions.get(name) {
        return Ok(kernel_deconstructed(Expr::Environment, path));
    }
    if let Some(index) = stack.entry_index(name) {
        let entry = &stack.environment_functions[index];
        return match &entry.expected_environment {
            ExpectedEnvironment::Independent => Ok(Expr::item(index, env_functions_expr())),
            ExpectedEnvironment::Imported { path_to_record } => {
                Ok(kernel_deconstructed(Expr::Environment, path_to_record))
            }
            ExpectedEnvironment::Local { expected_declarations } => {
                let projection = contract_projection(stack, expected_declarations)?;
                if entry.parameter_count == 0 {
                    // a value slot: evaluate its body now
                    Ok(Expr::parse_and_eval(
                        Expr::item(index, env_functions_expr()),
                        Expr::List(vec![projection, Expr::List(Vec::new())]),
                    ))
                } else {
                    // build a fresh closure record around the slot
                    Ok(Expr::List(vec![
                        Expr::lit(Value::name(FUNCTION_TAG)),
                        Expr::List(vec![
                            Expr::item(index, env_functions_expr()),
                            Expr::lit(Value::from_i64(entry.parameter_count as i64)),
                            projection,
                            Expr::List(Vec::new()),
                        ]),
                    ]))
                }
            }
        };
    }
    if let Some(value) = stack.imported_functions.get(name) {
        return Ok(Expr::lit(value.clone()));
    }
    Err(CompileError::unresolved(
        name,
        if stack.environment_functions.is_empty() && stack.environment_deconstructions.is_empty() {
            "the global environment".to_owned()
        } else {
            "the current declaration block".to_owned()
        },
    ))
}

fn kernel_deconstructed(expr: Expr, path: &[Deconstruction]) -> Expr {
    path.iter().fold(expr, |expr, step| match step {
        Deconstruction::ListItem(index) => Expr::item(*index, expr),
        Deconstruction::SkipItems(count) => Expr::skip(*count, expr),
        Deconstruction::KernelRoutine(routine) => {
            let encoded = Expr::lit(encode(routine));
            Expr::parse_and_eval(
                encoded,
                Expr::List(vec![Expr::List(Vec::new()), Expr::List(vec![expr])]),
            )
        }
    })
}

fn emit_application(
    stack: &EmitStack,
    function: &IrExpr,
    arguments: &[IrExpr],
) -> Result<Expr, CompileError> {
    let emitted_arguments = arguments
        .iter()
        .map(|argument| emit_expression(stack, argument))
        .collect::<Result<Vec<_>, _>>()?;

    // an anonymous function applied to exactly its arity needs no record and
    // no trampoline
    if let IrExpr::Function { parameters, body } = function {
        let parts = emit_closure(stack, parameters, body)?;
        if parts.parameter_count == emitted_arguments.len() {
            return Ok(Expr::parse_and_eval(
                Expr::lit(encode(&parts.inner)),
                Expr::List(vec![parts.env_list, Expr::List(emitted_arguments)]),
            ));
        }
        return Ok(trampoline_call(
            stack,
            closure_record_expr(&parts),
            emitted_arguments,
        ));
    }

    if let IrExpr::Reference(name) = function {
        if stack.environment_deconstructions.get(name.as_str()).is_none() {
            if let Some(index) = stack.entry_index(name) {
                let entry = stack.environment_functions[index].clone();
                return emit_slot_application(stack, &entry, index, emitted_arguments);
            }
            if let Some(value) = stack.imported_functions.get(name.as_str()) {
                return Ok(apply_known_value(stack, value.clone(), emitted_arguments));
            }
            return Err(CompileError::unresolved(name, "the current declaration block"));
        }
    }

    // generic path: evaluate the function operand, then dispatch on what is
    // statically known about it
    let function_expr = reduce(emit_expression(stack, function)?);
    if let Expr::Literal(value) = &function_expr {
        return Ok(apply_known_value(stack, value.clone(), emitted_arguments));
    }
    Ok(trampoline_call(stack, function_expr, emitted_arguments))
}

/// Applies a slot of the current pool.
fn emit_slot_application(
    stack: &EmitStack,
    entry: &EnvFnEntry,
    index: usize,
    arguments: Vec<Expr>,
) -> Result<Expr, CompileError> {
    match &entry.expected_environment {
        ExpectedEnvironment::Local { expected_declarations } => {
            if entry.parameter_count == arguments.len() && entry.parameter_count > 0 {
                let projection = contract_projection(stack, expected_declarations)?;
                return Ok(Expr::parse_and_eval(
                    Expr::item(index, env_functions_expr()),
                    Expr::List(vec![projection, Expr::List(arguments)]),
                ));
            }
            let value = resolve_reference(stack, &entry.name)?;
            Ok(trampoline_call(stack, value, arguments))
        }
        ExpectedEnvironment::Imported { path_to_record } => {
            let record = kernel_deconstructed(Expr::Environment, path_to_record);
            if entry.parameter_count == arguments.len() && entry.parameter_count > 0 {
                // follow the function-record shape: [tag, [inner, count, envFns, collected]]
                let fields = Expr::item(1, record);
                return Ok(Expr::parse_and_eval(
                    Expr::item(0, fields.clone()),
                    Expr::List(vec![Expr::item(2, fields), Expr::List(arguments)]),
                ));
            }
            Ok(trampoline_call(stack, record, arguments))
        }
        ExpectedEnvironment::Independent => {
            let value = Expr::item(index, env_functions_expr());
            Ok(trampoline_call(stack, value, arguments))
        }
    }
}

/// Applies a closed value known at compile time: full applications go
/// straight to the inner body, partial applications are collected
/// statically, everything else goes through the trampoline.
fn apply_known_value(stack: &EmitStack, value: Value, arguments: Vec<Expr>) -> Expr {
    if let Some((inner, parameter_count, env_functions, collected)) = parse_function_record(&value)
    {
        if collected.is_empty() {
            if parameter_count == arguments.len() {
                return Expr::parse_and_eval(
                    Expr::lit(inner.clone()),
                    Expr::List(vec![
                        Expr::lit(Value::List(env_functions.to_vec())),
                        Expr::List(arguments),
                    ]),
                );
            }
            if parameter_count > arguments.len() {
                return Expr::List(vec![
                    Expr::lit(Value::name(FUNCTION_TAG)),
                    Expr::List(vec![
                        Expr::lit(inner.clone()),
                        Expr::lit(Value::from_i64(parameter_count as i64)),
                        Expr::lit(Value::List(env_functions.to_vec())),
                        Expr::List(arguments),
                    ]),
                ]);
            }
        }
    }
    trampoline_call(stack, Expr::lit(value), arguments)
}
