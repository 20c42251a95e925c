//! Rule model: rules, categories, the function contract and results

pub mod category;
pub mod function;
pub mod reports;
pub mod result;
pub mod rule;
pub mod templates;

pub use category::{RuleCategory, RuleCategoryRegistry};
pub use function::{
    options_as_string_map, validate_options, FunctionProperty, FunctionSchema, RuleFunction,
    RuleFunctionContext, FUNCTION_CATEGORY_CORE, FUNCTION_CATEGORY_CUSTOM, FUNCTION_CATEGORY_OPENAPI,
    FUNCTION_CATEGORY_OWASP,
};
pub use result::{Origin, Position, Range, RuleCategoryResult, RuleFunctionResult, RuleResultSet};
pub use rule::{Given, Rule, RuleAction, Severity, Then};
