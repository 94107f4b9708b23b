//! The front compiler: translates a parsed module (or interactive
//! submission) into IR, resolving imports and auto-imports, inlining type-tag
//! and record constructors, desugaring case/let/lambda/record syntax, and
//! re-associating operator applications.

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::errors::{CompileError, ResultContext};
use crate::ir::{Expr as IrExpr, FunctionParameter, ModuleInCompilation, TypeDecl};
use crate::kernel::{KernelFunction, RECORD_TAG, Value};
use crate::pattern::plan_pattern;
use crate::precedence::reassociate;
use crate::routines::{RECORD_ACCESS, RECORD_UPDATE};
use crate::syntax::{
    Declaration, ExposeItem, Exposing, Expression, ExpressionKind, FunctionDeclaration,
    LetDeclaration, Pattern, SyntaxFile, module_name_string,
};

/// The modules implicitly imported into every module except themselves.
pub const AUTO_IMPORTED_MODULES: &[&str] =
    &["Basics", "Maybe", "List", "String", "Result", "Char", "Tuple"];

/// The message value a case expression without a matching branch evaluates
/// alongside the subject.
const MISSING_BRANCH_MESSAGE: &str = "Error in case-of block: No matching branch.";

const DEBUG_TO_STRING_PLACEHOLDER: &str = "<Debug.toString is not implemented>";

/// Standard operators and the core function each resolves to.
fn global_operator_target(operator: &str) -> Option<(&'static str, &'static str)> {
    Some(match operator {
        "+" => ("Basics", "add"),
        "-" => ("Basics", "sub"),
        "*" => ("Basics", "mul"),
        "//" => ("Basics", "idiv"),
        "^" => ("Basics", "pow"),
        "==" => ("Basics", "eq"),
        "/=" => ("Basics", "neq"),
        "<" => ("Basics", "lt"),
        ">" => ("Basics", "gt"),
        "<=" => ("Basics", "le"),
        ">=" => ("Basics", "ge"),
        "&&" => ("Basics", "and"),
        "||" => ("Basics", "or"),
        "++" => ("Basics", "append"),
        "<|" => ("Basics", "apL"),
        "|>" => ("Basics", "apR"),
        "<<" => ("Basics", "composeL"),
        ">>" => ("Basics", "composeR"),
        "::" => ("List", "cons"),
        _ => return None,
    })
}

/// A name exposed into every module's scope without any import. Function
/// entries keep the queried name inside the named module.
enum GlobalExposed {
    Function { module: &'static str },
    Tag { arity: usize },
    Bool(bool),
}

fn globally_exposed(name: &str) -> Option<GlobalExposed> {
    Some(match name {
        "True" => GlobalExposed::Bool(true),
        "False" => GlobalExposed::Bool(false),
        "Just" | "Ok" | "Err" => GlobalExposed::Tag { arity: 1 },
        "Nothing" | "LT" | "EQ" | "GT" => GlobalExposed::Tag { arity: 0 },
        "not" | "negate" | "abs" | "compare" | "min" | "max" | "modBy" | "remainderBy"
        | "identity" | "always" | "xor" => GlobalExposed::Function { module: "Basics" },
        _ => return None,
    })
}

/// An inline-compiled declaration: used at each reference site instead of a
/// runtime closure.
#[derive(Debug, Clone)]
enum Inlineable {
    Tag { tag: String, arity: usize },
    RecordConstructor { fields: Vec<String> },
    Bool(bool),
}

/// A name bound in the current lexical scope.
#[derive(Debug, Clone)]
enum Binding {
    /// A parameter or let declaration, by its emitted (possibly renamed)
    /// name.
    Local(String),
    /// A case or destructuring binding, inlined at each use site.
    Inline(IrExpr),
}

/// The lexical scope threaded through expression compilation. Cloned at
/// each branching construct; never mutated upward.
#[derive(Debug, Clone, Default)]
struct Scope {
    bindings: AHashMap<String, Binding>,
}

/// How a reference resolves before any application is considered.
enum Resolution {
    Expr(IrExpr),
    Tag { tag: String, arity: usize },
    RecordConstructor { fields: Vec<String> },
}

/// Per-module (or per-submission) compilation context.
pub struct Compiler<'a> {
    module_name: String,
    available: &'a AHashMap<String, ModuleInCompilation>,
    /// Local (alias or canonical) module name to canonical dotted name.
    module_aliases: AHashMap<String, String>,
    /// Unqualified imported value names to their qualified reference.
    imported_values: AHashMap<String, String>,
    /// Tag and record constructors in scope: local types, and types opened
    /// by imports.
    inlineables: AHashMap<String, Inlineable>,
    /// Operator to implementing-function name, from this module's infix
    /// declarations.
    operator_aliases: AHashMap<String, String>,
    /// Top-level declaration names of the module being compiled.
    module_declarations: AHashSet<String>,
    /// Declarations already present in the interactive environment.
    environment_declarations: AHashSet<String>,
    /// Names used so far; renaming keeps every binder unique within one
    /// compilation so the emitter's pools never alias.
    used_names: AHashSet<String>,
    fresh_counter: u32,
}

impl<'a> Compiler<'a> {
    fn new(module_name: String, available: &'a AHashMap<String, ModuleInCompilation>) -> Self {
        Self {
            module_name,
            available,
            module_aliases: AHashMap::new(),
            imported_values: AHashMap::new(),
            inlineables: AHashMap::new(),
            operator_aliases: AHashMap::new(),
            module_declarations: AHashSet::new(),
            environment_declarations: AHashSet::new(),
            used_names: AHashSet::new(),
            fresh_counter: 0,
        }
    }

    fn fresh_name(&mut self, base: &str) -> String {
        let name = format!("{base}@{}", self.fresh_counter);
        self.fresh_counter += 1;
        self.used_names.insert(name.clone());
        name
    }

    /// Registers a binder, renaming it when the name was already used
    /// anywhere in this compilation.
    fn bind_local(&mut self, scope: &mut Scope, name: &str) -> String {
        let emitted = if self.used_names.insert(name.to_owned()) {
            name.to_owned()
        } else {
            self.fresh_name(name)
        };
        scope
            .bindings
            .insert(name.to_owned(), Binding::Local(emitted.clone()));
        emitted
    }

    // === imports ===========================================================

    fn process_imports(&mut self, file: &SyntaxFile) {
        for import in &file.imports {
            let canonical = module_name_string(&import.module_name);
            if !self.available.contains_key(&canonical) {
                continue;
            }
            self.module_aliases.insert(canonical.clone(), canonical.clone());
            if let Some(alias) = &import.alias {
                self.module_aliases.insert(alias.clone(), canonical.clone());
            }
            if let Some(exposing) = &import.exposing {
                self.expose_from(&canonical, exposing);
            }
        }
        for auto in AUTO_IMPORTED_MODULES {
            if *auto == self.module_name || !self.available.contains_key(*auto) {
                continue;
            }
            self.module_aliases
                .entry((*auto).to_owned())
                .or_insert_with(|| (*auto).to_owned());
        }
    }

    fn expose_from(&mut self, canonical: &str, exposing: &Exposing) {
        let Some(module) = self.available.get(canonical) else { return };
        match exposing {
            Exposing::All => {
                for name in module.functions.keys() {
                    self.imported_values
                        .entry(name.clone())
                        .or_insert_with(|| format!("{canonical}.{name}"));
                }
                for (type_name, declaration) in &module.types {
                    self.expose_type(type_name, declaration, true);
                }
            }
            Exposing::Explicit(items) => {
                for item in items {
                    match item {
                        ExposeItem::Value(name) => {
                            if module.functions.contains_key(name) {
                                self.imported_values
                                    .entry(name.clone())
                                    .or_insert_with(|| format!("{canonical}.{name}"));
                            }
                        }
                        ExposeItem::Type { name, open } => {
                            if let Some(declaration) = module.types.get(name) {
                                self.expose_type(name, declaration, *open);
                            }
                        }
                        // operator exposure is covered by the fixed global
                        // table
                        ExposeItem::Operator(_) => {}
                    }
                }
            }
        }
    }

    fn expose_type(&mut self, type_name: &str, declaration: &TypeDecl, open: bool) {
        match declaration {
            TypeDecl::ChoiceType { tags } => {
                if open {
                    for (tag, arity) in tags {
                        self.inlineables.entry(tag.clone()).or_insert(Inlineable::Tag {
                            tag: tag.clone(),
                            arity: *arity,
                        });
                    }
                }
            }
            TypeDecl::RecordType { fields } => {
                self.inlineables
                    .entry(type_name.to_owned())
                    .or_insert(Inlineable::RecordConstructor {
                        fields: fields.clone(),
                    });
            }
        }
    }

    fn register_local_types(&mut self, file: &SyntaxFile) -> IndexMap<String, TypeDecl> {
        let mut types = IndexMap::new();
        for declaration in &file.declarations {
            match declaration {
                Declaration::CustomType(custom) => {
                    let mut tags = IndexMap::new();
                    for variant in &custom.variants {
                        tags.insert(variant.name.clone(), variant.arity);
                        // the boolean tags compile to the literal kernel
                        // booleans everywhere, including their home module
                        let inlineable = match variant.name.as_str() {
                            "True" => Inlineable::Bool(true),
                            "False" => Inlineable::Bool(false),
                            _ => Inlineable::Tag {
                                tag: variant.name.clone(),
                                arity: variant.arity,
                            },
                        };
                        self.inlineables.insert(variant.name.clone(), inlineable);
                    }
                    types.insert(custom.name.clone(), TypeDecl::ChoiceType { tags });
                }
                Declaration::TypeAlias(alias) => {
                    if let Some(fields) = &alias.record_fields {
                        self.inlineables.insert(
                            alias.name.clone(),
                            Inlineable::RecordConstructor {
                                fields: fields.clone(),
                            },
                        );
                        types.insert(
                            alias.name.clone(),
                            TypeDecl::RecordType {
                                fields: fields.clone(),
                            },
                        );
                    }
                }
                Declaration::Infix(infix) => {
                    self.operator_aliases
                        .insert(infix.operator.clone(), infix.function.clone());
                }
                Declaration::Function(_) | Declaration::Port(_) => {}
            }
        }
        types
    }

    /// The map the emitter resolves qualified references against: every
    /// function of every imported module, plus prior interactive
    /// declarations.
    fn imported_functions_for_emitter(&self) -> AHashMap<String, Value> {
        let mut map = AHashMap::new();
        let canonical_names: AHashSet<&String> = self.module_aliases.values().collect();
        for canonical in canonical_names {
            if let Some(module) = self.available.get(canonical) {
                for (name, value) in &module.functions {
                    map.insert(format!("{canonical}.{name}"), value.clone());
                }
            }
        }
        map
    }

    // === declarations ======================================================

    fn compile_function_declaration(
        &mut self,
        declaration: &FunctionDeclaration,
    ) -> Result<IrExpr, CompileError> {
        let mut scope = Scope::default();
        let parameters = self.compile_parameters(&mut scope, &declaration.arguments)?;
        let body = reassociate(declaration.body.clone());
        let body = self.compile_expression(&scope, &body)?;
        if parameters.is_empty() {
            return Ok(body);
        }
        // merge a lambda body into the parameter list so `f x = ...` and
        // `f = \x -> ...` emit identically
        match body {
            IrExpr::Function {
                parameters: inner_parameters,
                body: inner_body,
            } => {
                let mut merged = parameters;
                merged.extend(inner_parameters);
                Ok(IrExpr::Function {
                    parameters: merged,
                    body: inner_body,
                })
            }
            other => Ok(IrExpr::Function {
                parameters,
                body: Box::new(other),
            }),
        }
    }

    fn compile_parameters(
        &mut self,
        scope: &mut Scope,
        patterns: &[Pattern],
    ) -> Result<Vec<FunctionParameter>, CompileError> {
        patterns
            .iter()
            .map(|pattern| {
                let plan = plan_pattern(pattern)?;
                Ok(plan
                    .bindings
                    .into_iter()
                    .map(|(name, path)| (self.bind_local(scope, &name), path))
                    .collect())
            })
            .collect()
    }

    // === expressions =======================================================

    fn compile_expression(
        &mut self,
        scope: &Scope,
        expression: &Expression,
    ) -> Result<IrExpr, CompileError> {
        match &expression.kind {
            ExpressionKind::Integer(n) => Ok(IrExpr::lit(Value::from_bigint(n))),
            ExpressionKind::Float(_) => {
                Err(CompileError::unsupported("floating-point literal"))
            }
            ExpressionKind::Character(c) => Ok(IrExpr::lit(Value::from_char(*c))),
            ExpressionKind::StringLiteral(s) => Ok(IrExpr::lit(Value::string(s))),
            ExpressionKind::Negation(inner) => Ok(IrExpr::negate(
                self.compile_expression(scope, inner)?,
            )),
            ExpressionKind::If {
                condition,
                then_branch,
                else_branch,
            } => Ok(IrExpr::conditional(
                self.compile_expression(scope, condition)?,
                self.compile_expression(scope, then_branch)?,
                self.compile_expression(scope, else_branch)?,
            )),
            ExpressionKind::ListLiteral(items) | ExpressionKind::Tuple(items) => {
                Ok(IrExpr::List(
                    items
                        .iter()
                        .map(|item| self.compile_expression(scope, item))
                        .collect::<Result<Vec<_>, _>>()?,
                ))
            }
            ExpressionKind::Unit => Ok(IrExpr::List(Vec::new())),
            ExpressionKind::Parenthesized(inner) => self.compile_expression(scope, inner),
            ExpressionKind::Lambda { parameters, body } => {
                let mut inner_scope = scope.clone();
                let parameters = self.compile_parameters(&mut inner_scope, parameters)?;
                let body = self.compile_expression(&inner_scope, body)?;
                Ok(IrExpr::Function {
                    parameters,
                    body: Box::new(body),
                })
            }
            ExpressionKind::Application(parts) => self.compile_application(scope, parts),
            ExpressionKind::OperatorApplication { operator, left, right } => {
                let function = self.resolve_operator(operator);
                let arguments = vec![
                    self.compile_expression(scope, left)?,
                    self.compile_expression(scope, right)?,
                ];
                Ok(IrExpr::apply(function, arguments))
            }
            ExpressionKind::PrefixOperator(operator) => Ok(self.resolve_operator(operator)),
            ExpressionKind::FunctionOrValue { module, name } => {
                match self.resolve_value(scope, module, name)? {
                    Resolution::Expr(expr) => Ok(expr),
                    Resolution::Tag { tag, arity } => self.compile_tag(&tag, arity, Vec::new()),
                    Resolution::RecordConstructor { fields } => {
                        self.compile_record_constructor(&fields, Vec::new())
                    }
                }
            }
            ExpressionKind::RecordLiteral(fields) => {
                let compiled = fields
                    .iter()
                    .map(|(name, value)| {
                        Ok((name.clone(), self.compile_expression(scope, value)?))
                    })
                    .collect::<Result<Vec<_>, CompileError>>()?;
                Ok(record_literal(compiled))
            }
            ExpressionKind::FieldAccess { record, field } => {
                let record = self.compile_expression(scope, record)?;
                Ok(record_access(record, field))
            }
            ExpressionKind::FieldAccessFunction(field) => {
                let parameter = self.fresh_name("record");
                Ok(IrExpr::Function {
                    parameters: vec![vec![(parameter.clone(), Vec::new())]],
                    body: Box::new(record_access(IrExpr::Reference(parameter), field)),
                })
            }
            ExpressionKind::RecordUpdate { record_name, fields } => {
                let base = match self.resolve_value(scope, &[], record_name)? {
                    Resolution::Expr(expr) => expr,
                    _ => {
                        return Err(CompileError::unsupported(
                            "record update on a constructor",
                        ));
                    }
                };
                let pairs = fields
                    .iter()
                    .map(|(name, value)| {
                        Ok(IrExpr::List(vec![
                            IrExpr::lit(Value::name(name)),
                            self.compile_expression(scope, value)?,
                        ]))
                    })
                    .collect::<Result<Vec<_>, CompileError>>()?;
                Ok(IrExpr::KernelRoutine {
                    routine: RECORD_UPDATE.clone(),
                    argument: Box::new(IrExpr::List(vec![base, IrExpr::List(pairs)])),
                })
            }
            ExpressionKind::LetIn { declarations, body } => {
                self.compile_let(scope, declarations, body)
            }
            ExpressionKind::CaseOf { subject, branches } => {
                self.compile_case(scope, subject, branches)
            }
        }
    }

    fn compile_application(
        &mut self,
        scope: &Scope,
        parts: &[Expression],
    ) -> Result<IrExpr, CompileError> {
        let (function, argument_expressions) = parts
            .split_first()
            .ok_or_else(|| CompileError::invariant("empty application"))?;

        if let ExpressionKind::FunctionOrValue { module, name } = &function.kind {
            let canonical = self.canonical_module(module);
            match canonical.as_deref() {
                Some("Pine_kernel") => {
                    let [argument] = argument_expressions else {
                        return Err(CompileError::unsupported(
                            "kernel functions take exactly one argument",
                        ));
                    };
                    let kernel_function = name.parse::<KernelFunction>().map_err(|_| {
                        CompileError::unresolved(
                            format!("Pine_kernel.{name}"),
                            "the kernel function set",
                        )
                    })?;
                    return Ok(IrExpr::kernel(
                        kernel_function,
                        self.compile_expression(scope, argument)?,
                    ));
                }
                Some("Debug") => match (name.as_str(), argument_expressions) {
                    // Debug.log compiles to the identity on its second
                    // argument
                    ("log", [_, value]) => return self.compile_expression(scope, value),
                    ("toString", [_]) => {
                        return Ok(IrExpr::lit(Value::string(DEBUG_TO_STRING_PLACEHOLDER)));
                    }
                    _ => {
                        return Err(CompileError::unsupported(format!(
                            "Debug.{name} with {} arguments",
                            argument_expressions.len()
                        )));
                    }
                },
                _ => {}
            }

            let arguments = argument_expressions
                .iter()
                .map(|argument| self.compile_expression(scope, argument))
                .collect::<Result<Vec<_>, _>>()?;
            return match self.resolve_value(scope, module, name)? {
                Resolution::Expr(expr) => {
                    if arguments.is_empty() {
                        Ok(expr)
                    } else {
                        Ok(IrExpr::apply(expr, arguments))
                    }
                }
                Resolution::Tag { tag, arity } => self.compile_tag(&tag, arity, arguments),
                Resolution::RecordConstructor { fields } => {
                    self.compile_record_constructor(&fields, arguments)
                }
            };
        }

        let function = self.compile_expression(scope, function)?;
        let arguments = argument_expressions
            .iter()
            .map(|argument| self.compile_expression(scope, argument))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(IrExpr::apply(function, arguments))
    }

    /// A tag applied to some arguments: fully applied tags inline to the
    /// tagged-list shape; under-applied tags become a builder closure.
    fn compile_tag(
        &mut self,
        tag: &str,
        arity: usize,
        arguments: Vec<IrExpr>,
    ) -> Result<IrExpr, CompileError> {
        if arguments.len() == arity {
            return Ok(IrExpr::List(vec![
                IrExpr::lit(Value::name(tag)),
                IrExpr::List(arguments),
            ]));
        }
        if arguments.len() > arity {
            return Err(CompileError::unsupported(format!(
                "tag {tag} applied to {} arguments but takes {arity}",
                arguments.len()
            )));
        }
        let mut parameters = Vec::new();
        let mut all_arguments = arguments;
        for _ in all_arguments.len()..arity {
            let parameter = self.fresh_name("tagArg");
            parameters.push(vec![(parameter.clone(), Vec::new())]);
            all_arguments.push(IrExpr::Reference(parameter));
        }
        Ok(IrExpr::Function {
            parameters,
            body: Box::new(IrExpr::List(vec![
                IrExpr::lit(Value::name(tag)),
                IrExpr::List(all_arguments),
            ])),
        })
    }

    /// A record constructor: positional arguments follow the declared field
    /// order, and the built record is sorted at construction time.
    fn compile_record_constructor(
        &mut self,
        fields: &[String],
        arguments: Vec<IrExpr>,
    ) -> Result<IrExpr, CompileError> {
        if arguments.len() > fields.len() {
            return Err(CompileError::unsupported(format!(
                "record constructor applied to {} arguments but takes {}",
                arguments.len(),
                fields.len()
            )));
        }
        let mut parameters = Vec::new();
        let mut all_arguments = arguments;
        for _ in all_arguments.len()..fields.len() {
            let parameter = self.fresh_name("fieldArg");
            parameters.push(vec![(parameter.clone(), Vec::new())]);
            all_arguments.push(IrExpr::Reference(parameter));
        }
        let pairs = fields
            .iter()
            .cloned()
            .zip(all_arguments)
            .collect::<Vec<_>>();
        let record = record_literal(pairs);
        if parameters.is_empty() {
            Ok(record)
        } else {
            Ok(IrExpr::Function {
                parameters,
                body: Box::new(record),
            })
        }
    }

    fn canonical_module(&self, module: &[String]) -> Option<String> {
        if module.is_empty() {
            return None;
        }
        let dotted = module_name_string(module);
        if dotted == "Pine_kernel" || dotted == "Debug" {
            return Some(dotted);
        }
        Some(
            self.module_aliases
                .get(&dotted)
                .cloned()
                .unwrap_or(dotted),
        )
    }

    fn resolve_operator(&self, operator: &str) -> IrExpr {
        if let Some(target) = self.operator_aliases.get(operator) {
            return IrExpr::Reference(target.clone());
        }
        if let Some((module, name)) = global_operator_target(operator) {
            if module == self.module_name {
                return IrExpr::Reference(name.to_owned());
            }
            return IrExpr::Reference(format!("{module}.{name}"));
        }
        // left for the emitter to report as unresolved
        IrExpr::Reference(format!("({operator})"))
    }

    fn resolve_value(
        &self,
        scope: &Scope,
        module: &[String],
        name: &str,
    ) -> Result<Resolution, CompileError> {
        if module.is_empty() {
            if let Some(binding) = scope.bindings.get(name) {
                return Ok(match binding {
                    Binding::Local(emitted) => Resolution::Expr(IrExpr::Reference(emitted.clone())),
                    Binding::Inline(expr) => Resolution::Expr(expr.clone()),
                });
            }
            if let Some(inlineable) = self.inlineables.get(name) {
                return Ok(resolution_of_inlineable(inlineable));
            }
            if self.module_declarations.contains(name) {
                return Ok(Resolution::Expr(IrExpr::Reference(name.to_owned())));
            }
            if self.environment_declarations.contains(name) {
                return Ok(Resolution::Expr(IrExpr::Reference(name.to_owned())));
            }
            if let Some(qualified) = self.imported_values.get(name) {
                return Ok(Resolution::Expr(IrExpr::Reference(qualified.clone())));
            }
            return Ok(match globally_exposed(name) {
                Some(GlobalExposed::Bool(value)) => {
                    Resolution::Expr(IrExpr::lit(Value::bool_value(value)))
                }
                Some(GlobalExposed::Tag { arity }) => Resolution::Tag {
                    tag: name.to_owned(),
                    arity,
                },
                Some(GlobalExposed::Function { module }) if module != self.module_name => {
                    Resolution::Expr(IrExpr::Reference(format!("{module}.{name}")))
                }
                // inside the module itself the global table falls back to
                // the local declaration; anything still unknown is left for
                // the emitter to report
                Some(GlobalExposed::Function { .. }) | None => {
                    Resolution::Expr(IrExpr::Reference(name.to_owned()))
                }
            });
        }

        let canonical = self
            .canonical_module(module)
            .unwrap_or_else(|| module_name_string(module));
        if canonical == self.module_name {
            if let Some(inlineable) = self.inlineables.get(name) {
                return Ok(resolution_of_inlineable(inlineable));
            }
            return Ok(Resolution::Expr(IrExpr::Reference(name.to_owned())));
        }
        if let Some(available) = self.available.get(&canonical) {
            if name.chars().next().is_some_and(char::is_uppercase) {
                for (type_name, declaration) in &available.types {
                    match declaration {
                        TypeDecl::ChoiceType { tags } => {
                            if let Some(arity) = tags.get(name) {
                                return Ok(Resolution::Tag {
                                    tag: name.to_owned(),
                                    arity: *arity,
                                });
                            }
                        }
                        TypeDecl::RecordType { fields } => {
                            if type_name == name {
                                return Ok(Resolution::RecordConstructor {
                                    fields: fields.clone(),
                                });
                            }
                        }
                    }
                }
            }
        }
        Ok(Resolution::Expr(IrExpr::Reference(format!(
            "{canonical}.{name}"
        ))))
    }

    // === let and case ======================================================

    fn compile_let(
        &mut self,
        scope: &Scope,
        declarations: &[LetDeclaration],
        body: &Expression,
    ) -> Result<IrExpr, CompileError> {
        let mut inner_scope = scope.clone();

        // register every let function first: the block is mutually recursive
        let mut emitted_names = Vec::new();
        for declaration in declarations {
            if let LetDeclaration::Function(function) = declaration {
                emitted_names.push(self.bind_local(&mut inner_scope, &function.name));
            }
        }

        // destructurings inline one binding per leaf name
        for declaration in declarations {
            if let LetDeclaration::Destructuring { pattern, expression } = declaration {
                let compiled = self.compile_expression(&inner_scope, expression)?;
                let plan = plan_pattern(pattern)?;
                for (name, path) in plan.bindings {
                    let inlined = compiled.clone().deconstructed(&path);
                    inner_scope.bindings.insert(name, Binding::Inline(inlined));
                }
            }
        }

        let mut compiled_declarations = IndexMap::new();
        let mut name_index = 0;
        for declaration in declarations {
            if let LetDeclaration::Function(function) = declaration {
                let emitted_name = emitted_names[name_index].clone();
                name_index += 1;
                let mut function_scope = inner_scope.clone();
                let parameters =
                    self.compile_parameters(&mut function_scope, &function.arguments)?;
                let compiled_body = self
                    .compile_expression(&function_scope, &function.body)
                    .context(format!("Failed to compile function '{}'", function.name))?;
                let compiled = if parameters.is_empty() {
                    compiled_body
                } else {
                    IrExpr::Function {
                        parameters,
                        body: Box::new(compiled_body),
                    }
                };
                compiled_declarations.insert(emitted_name, compiled);
            }
        }

        let body = self.compile_expression(&inner_scope, body)?;
        if compiled_declarations.is_empty() {
            return Ok(body);
        }
        Ok(IrExpr::DeclarationBlock {
            declarations: compiled_declarations,
            body: Box::new(body),
        })
    }

    fn compile_case(
        &mut self,
        scope: &Scope,
        subject: &Expression,
        branches: &[(Pattern, Expression)],
    ) -> Result<IrExpr, CompileError> {
        let subject = self.compile_expression(scope, subject)?;

        // two candidate forms: the subject inlined at every use, or bound
        // once in a declaration block; keep whichever applies fewer
        // functions
        let inline = self.build_case(scope, &subject, branches)?;
        let shared_name = self.fresh_name("caseSubject");
        let shared_body =
            self.build_case(scope, &IrExpr::Reference(shared_name.clone()), branches)?;
        let mut shared_declarations = IndexMap::new();
        shared_declarations.insert(shared_name, subject);
        let shared = IrExpr::DeclarationBlock {
            declarations: shared_declarations,
            body: Box::new(shared_body),
        };

        if inline.count_applications() <= shared.count_applications() {
            Ok(inline)
        } else {
            Ok(shared)
        }
    }

    fn build_case(
        &mut self,
        scope: &Scope,
        subject: &IrExpr,
        branches: &[(Pattern, Expression)],
    ) -> Result<IrExpr, CompileError> {
        let mut result = IrExpr::List(vec![
            IrExpr::lit(Value::string(MISSING_BRANCH_MESSAGE)),
            subject.clone(),
        ]);
        for (pattern, body) in branches.iter().rev() {
            let plan = plan_pattern(pattern)?;
            let mut branch_scope = scope.clone();
            for (name, path) in &plan.bindings {
                let inlined = subject.clone().deconstructed(path);
                branch_scope
                    .bindings
                    .insert(name.clone(), Binding::Inline(inlined));
            }
            let compiled_body = self.compile_expression(&branch_scope, body)?;
            result = match plan.condition(subject) {
                // an irrefutable branch always matches; anything below it is
                // unreachable
                None => compiled_body,
                Some(condition) => IrExpr::conditional(condition, compiled_body, result),
            };
        }
        Ok(result)
    }
}

fn resolution_of_inlineable(inlineable: &Inlineable) -> Resolution {
    match inlineable {
        Inlineable::Tag { tag, arity } => Resolution::Tag {
            tag: tag.clone(),
            arity: *arity,
        },
        Inlineable::RecordConstructor { fields } => Resolution::RecordConstructor {
            fields: fields.clone(),
        },
        Inlineable::Bool(value) => Resolution::Expr(IrExpr::lit(Value::bool_value(*value))),
    }
}

/// Builds a record literal IR with fields sorted lexicographically.
fn record_literal(mut fields: Vec<(String, IrExpr)>) -> IrExpr {
    fields.sort_by(|(a, _), (b, _)| a.cmp(b));
    let pairs = fields
        .into_iter()
        .map(|(name, value)| IrExpr::List(vec![IrExpr::lit(Value::name(&name)), value]))
        .collect();
    IrExpr::List(vec![
        IrExpr::lit(Value::name(RECORD_TAG)),
        IrExpr::List(vec![IrExpr::List(pairs)]),
    ])
}

fn record_access(record: IrExpr, field: &str) -> IrExpr {
    IrExpr::KernelRoutine {
        routine: RECORD_ACCESS.clone(),
        argument: Box::new(IrExpr::List(vec![record, IrExpr::lit(Value::name(field))])),
    }
}

/// Compiles a parsed module against the already-compiled modules.
pub fn compile_module(
    file: &SyntaxFile,
    available: &AHashMap<String, ModuleInCompilation>,
) -> Result<ModuleInCompilation, CompileError> {
    let module_name = module_name_string(&file.module.name);
    let mut compiler = Compiler::new(module_name.clone(), available);

    for declaration in &file.declarations {
        if let Declaration::Port(port) = declaration {
            return Err(CompileError::unsupported(format!(
                "port declaration '{}'",
                port.name
            ))
            .context(format!("Failed to compile module '{module_name}'")));
        }
    }

    let types = compiler.register_local_types(file);
    compiler.process_imports(file);

    for declaration in &file.declarations {
        if let Declaration::Function(function) = declaration {
            compiler.module_declarations.insert(function.name.clone());
            compiler.used_names.insert(function.name.clone());
        }
    }

    let mut declarations = IndexMap::new();
    for declaration in &file.declarations {
        if let Declaration::Function(function) = declaration {
            let compiled = compiler
                .compile_function_declaration(function)
                .context(format!("Failed to compile function '{}'", function.name))
                .context(format!("Failed to compile module '{module_name}'"))?;
            declarations.insert(function.name.clone(), compiled);
        }
    }

    let exposed: Vec<String> = match &file.module.exposing {
        Exposing::All => declarations.keys().cloned().collect(),
        Exposing::Explicit(items) => items
            .iter()
            .filter_map(|item| match item {
                ExposeItem::Value(name) => Some(name.clone()),
                ExposeItem::Operator(operator) => {
                    compiler.operator_aliases.get(operator).cloned()
                }
                ExposeItem::Type { .. } => None,
            })
            .filter(|name| declarations.contains_key(name))
            .collect(),
    };

    let imported = compiler.imported_functions_for_emitter();
    let functions = crate::emit::emit_module(&declarations, &exposed, &imported)
        .context(format!("Failed to compile module '{module_name}'"))?;

    Ok(ModuleInCompilation { functions, types })
}

/// Compiles an interactive expression submission to IR, returning the
/// emitter's imported-function map alongside it.
pub fn compile_interactive_expression(
    available: &AHashMap<String, ModuleInCompilation>,
    environment_declarations: &[(String, Value)],
    expression: &Expression,
) -> Result<(IrExpr, AHashMap<String, Value>), CompileError> {
    let mut compiler = interactive_compiler(available, environment_declarations);
    let expression = reassociate(expression.clone());
    let compiled = compiler.compile_expression(&Scope::default(), &expression)?;
    let mut imported = compiler.imported_functions_for_emitter();
    for (name, value) in environment_declarations {
        imported.insert(name.clone(), value.clone());
    }
    Ok((compiled, imported))
}

/// Compiles an interactive declaration submission into a closed value, using
/// the module emitter on a single-declaration block.
pub fn compile_interactive_declaration(
    available: &AHashMap<String, ModuleInCompilation>,
    environment_declarations: &[(String, Value)],
    declaration: &FunctionDeclaration,
) -> Result<Value, CompileError> {
    let mut compiler = interactive_compiler(available, environment_declarations);
    compiler.module_declarations.insert(declaration.name.clone());
    compiler.used_names.insert(declaration.name.clone());
    let compiled = compiler
        .compile_function_declaration(declaration)
        .context(format!("Failed to compile declaration '{}'", declaration.name))?;
    let mut declarations = IndexMap::new();
    declarations.insert(declaration.name.clone(), compiled);
    let mut imported = compiler.imported_functions_for_emitter();
    for (name, value) in environment_declarations {
        imported.insert(name.clone(), value.clone());
    }
    let mut functions =
        crate::emit::emit_module(&declarations, &[declaration.name.clone()], &imported)?;
    functions
        .swap_remove(&declaration.name)
        .ok_or_else(|| CompileError::invariant("declaration vanished during emission"))
}

fn interactive_compiler<'a>(
    available: &'a AHashMap<String, ModuleInCompilation>,
    environment_declarations: &[(String, Value)],
) -> Compiler<'a> {
    let mut compiler = Compiler::new(String::new(), available);
    for name in available.keys() {
        compiler
            .module_aliases
            .insert(name.clone(), name.clone());
    }
    for (name, _) in environment_declarations {
        compiler.environment_declarations.insert(name.clone());
        compiler.used_names.insert(name.clone());
    }
    compiler
}

#[cfg(test)]
mod tests {
    use ahash::AHashMap;
    use pretty_assertions::assert_eq;

    use super::{Compiler, Scope};
    use crate::ir::Expr as IrExpr;
    use crate::kernel::{KernelFunction, Value};
    use crate::parse::parse_expression_text;

    fn compile(source: &str) -> IrExpr {
        let available = AHashMap::new();
        let mut compiler = Compiler::new("Test".to_owned(), &available);
        let expression =
            crate::precedence::reassociate(parse_expression_text(source).unwrap());
        compiler
            .compile_expression(&Scope::default(), &expression)
            .unwrap()
    }

    #[test]
    fn kernel_applications_are_special_cased() {
        let expr = compile("Pine_kernel.int_add [ 1, 2 ]");
        let IrExpr::KernelApplication { function, .. } = expr else {
            panic!("expected a kernel application, got {expr:?}")
        };
        assert_eq!(function, KernelFunction::IntAdd);
    }

    #[test]
    fn record_literals_sort_fields() {
        let expr = compile("{ b = 2, a = 1 }");
        let IrExpr::List(outer) = expr else { panic!("expected a list") };
        let IrExpr::List(wrapper) = &outer[1] else { panic!("expected the fields wrapper") };
        let IrExpr::List(pairs) = &wrapper[0] else { panic!("expected the pairs list") };
        let first_names: Vec<_> = pairs
            .iter()
            .map(|pair| {
                let IrExpr::List(pair) = pair else { panic!("expected a pair") };
                let IrExpr::Literal(name) = &pair[0] else { panic!("expected a name") };
                name.as_name().unwrap().to_owned()
            })
            .collect();
        assert_eq!(first_names, ["a", "b"]);
    }

    #[test]
    fn true_and_false_compile_to_literal_booleans() {
        assert_eq!(compile("True"), IrExpr::lit(Value::true_value()));
        assert_eq!(compile("False"), IrExpr::lit(Value::false_value()));
    }

    #[test]
    fn bare_tags_inline_and_under_applied_tags_close_over() {
        let expr = compile("Nothing");
        assert_eq!(
            expr,
            IrExpr::List(vec![
                IrExpr::lit(Value::name("Nothing")),
                IrExpr::List(Vec::new())
            ])
        );
        let applied = compile("Just 7");
        let IrExpr::List(parts) = &applied else { panic!("expected a tag list") };
        assert_eq!(parts[0], IrExpr::lit(Value::name("Just")));
        let bare = compile("Just");
        assert!(matches!(bare, IrExpr::Function { .. }), "got {bare:?}");
    }

    #[test]
    fn operators_resolve_through_the_global_table() {
        let expr = compile("1 + 2");
        let IrExpr::Application { function, .. } = expr else {
            panic!("expected an application")
        };
        assert_eq!(*function, IrExpr::Reference("Basics.add".to_owned()));
    }

    #[test]
    fn debug_log_is_identity_on_its_second_argument() {
        let expr = compile("Debug.log \"label\" 42");
        assert_eq!(expr, IrExpr::lit(Value::from_i64(42)));
    }

    #[test]
    fn case_bindings_inline_the_subject_deconstruction() {
        let expr = compile("case xs of\n    [] ->\n        0\n    x :: _ ->\n        x\n");
        // the branch body references no named binding: x was inlined away
        assert!(expr.free_references().contains("xs"));
        assert!(!expr.free_references().contains("x"));
    }

    #[test]
    fn let_functions_form_a_declaration_block() {
        let expr = compile("let\n    go n =\n        go n\nin\ngo 1");
        let IrExpr::DeclarationBlock { declarations, .. } = expr else {
            panic!("expected a declaration block, got {expr:?}")
        };
        assert_eq!(declarations.len(), 1);
    }

    #[test]
    fn shadowing_binders_are_renamed_apart() {
        let expr = compile("\\x -> let\n    x =\n        1\nin\nx");
        // the let binding shadows the parameter and must not collide with it
        let IrExpr::Function { body, .. } = expr else { panic!("expected a lambda") };
        let IrExpr::DeclarationBlock { declarations, body } = *body else {
            panic!("expected a declaration block")
        };
        let inner_name = declarations.keys().next().unwrap().clone();
        assert_ne!(inner_name, "x");
        assert_eq!(*body, IrExpr::Reference(inner_name));
    }
}
