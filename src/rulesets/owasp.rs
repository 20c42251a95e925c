//! Built-in OWASP API security rules

use crate::model::category::CATEGORY_OWASP;
use crate::model::{Rule, RuleAction, Severity};
use crate::spec_info::Format;
use indexmap::IndexMap;
use serde_json::{json, Value};

pub const OWASP_NO_NUMERIC_IDS: &str = "owasp-no-numeric-ids";
pub const OWASP_NO_HTTP_BASIC: &str = "owasp-no-http-basic";
pub const OWASP_NO_API_KEYS_IN_URL: &str = "owasp-no-api-keys-in-url";
pub const OWASP_NO_CREDENTIALS_IN_URL: &str = "owasp-no-credentials-in-url";
pub const OWASP_AUTH_INSECURE_SCHEMES: &str = "owasp-auth-insecure-schemes";
pub const OWASP_JWT_BEST_PRACTICES: &str = "owasp-jwt-best-practices";
pub const OWASP_PROTECTION_GLOBAL_UNSAFE: &str = "owasp-protection-global-unsafe";
pub const OWASP_PROTECTION_GLOBAL_UNSAFE_STRICT: &str = "owasp-protection-global-unsafe-strict";
pub const OWASP_PROTECTION_GLOBAL_SAFE: &str = "owasp-protection-global-safe";
pub const OWASP_DEFINE_ERROR_VALIDATION: &str = "owasp-define-error-validation";
pub const OWASP_DEFINE_ERROR_RESPONSES_401: &str = "owasp-define-error-responses-401";
pub const OWASP_DEFINE_ERROR_RESPONSES_500: &str = "owasp-define-error-responses-500";
pub const OWASP_DEFINE_ERROR_RESPONSES_429: &str = "owasp-define-error-responses-429";
pub const OWASP_RATE_LIMIT: &str = "owasp-rate-limit";
pub const OWASP_RATE_LIMIT_RETRY_AFTER: &str = "owasp-rate-limit-retry-after";
pub const OWASP_ARRAY_LIMIT: &str = "owasp-array-limit";
pub const OWASP_STRING_LIMIT: &str = "owasp-string-limit";
pub const OWASP_STRING_RESTRICTED: &str = "owasp-string-restricted";
pub const OWASP_INTEGER_LIMIT: &str = "owasp-integer-limit";
pub const OWASP_INTEGER_FORMAT: &str = "owasp-integer-format";
pub const OWASP_NO_ADDITIONAL_PROPERTIES: &str = "owasp-no-additionalProperties";
pub const OWASP_CONSTRAINED_ADDITIONAL_PROPERTIES: &str = "owasp-constrained-additionalProperties";
pub const OWASP_SECURITY_HOSTS_HTTPS_OAS3: &str = "owasp-security-hosts-https-oas3";

const PROTECTION_FIX: &str = "Make sure that all operations should be protected especially when they are not safe (methods that do not alter the state of the server) HTTP methods like `POST`, `PUT`, `PATCH`, and `DELETE`. This is done with one or more non-empty `security` rules. Security rules are defined in the `securityScheme` section.";

/// OWASP rules read the raw document and run once against the root
fn owasp(id: &str, name: &str, description: &str, severity: Severity, action: RuleAction, fix: &str) -> Rule {
    let mut rule = Rule::new(id)
        .with_name(name)
        .with_description(description)
        .with_given("$")
        .with_then(action)
        .with_severity(severity)
        .with_category(CATEGORY_OWASP)
        .with_how_to_fix(fix)
        .recommended()
        .unresolved();
    rule.documentation_url = format!("https://quobix.com/vacuum/rules/owasp/{}", id);
    rule
}

fn check_security(id: &str, severity: Severity, nullable: bool, methods: &[&str]) -> Rule {
    let description = if id == OWASP_PROTECTION_GLOBAL_UNSAFE {
        "API should be protected by a `security` rule either at global or operation level."
    } else {
        "Check if the operation is protected at operation level. Otherwise, check the global `security` property"
    };
    owasp(
        id,
        "Operation is not protected by any security scheme",
        description,
        severity,
        RuleAction::new("owaspCheckSecurity").with_options(json!({
            "schemesPath": ["securitySchemes"],
            "nullable": nullable,
            "methods": methods,
        })),
        PROTECTION_FIX,
    )
}

fn error_response(code: &str, severity: Severity) -> Rule {
    owasp(
        &format!("owasp-define-error-responses-{}", code),
        &format!("`{}` response should be defined", code),
        &format!("OWASP API Security recommends defining schemas for all responses, even error: {}", code),
        severity,
        RuleAction::new("owaspCheckErrorResponse").with_options(json!({ "code": code })),
        &format!(
            "For all endpoints, make sure that the {} response code is defined as well as its contents.",
            code
        ),
    )
}

fn simple(id: &str, name: &str, description: &str, severity: Severity, function: &str, fix: &str) -> Rule {
    owasp(id, name, description, severity, RuleAction::new(function), fix)
}

fn rate_limit_headers() -> Value {
    json!([
        ["X-RateLimit-Limit"],
        ["X-Rate-Limit-Limit"],
        ["RateLimit-Limit", "RateLimit-Reset"],
    ])
}

/// Every built-in OWASP rule, keyed by id
pub fn owasp_rules() -> IndexMap<String, Rule> {
    let rules = vec![
        check_security(OWASP_PROTECTION_GLOBAL_UNSAFE, Severity::Error, true, &["post", "put", "patch", "delete"]),
        check_security(OWASP_PROTECTION_GLOBAL_UNSAFE_STRICT, Severity::Info, false, &["post", "put", "patch", "delete"]),
        check_security(OWASP_PROTECTION_GLOBAL_SAFE, Severity::Info, true, &["get", "head"]),
        error_response("401", Severity::Warn),
        error_response("500", Severity::Warn),
        error_response("429", Severity::Warn),
        owasp(
            OWASP_DEFINE_ERROR_VALIDATION,
            "Missing error response of either `400`, `422` or `4XX`",
            "Missing error response of either `400`, `422` or `4XX`, Ensure all errors are documented.",
            Severity::Warn,
            RuleAction::new("owaspDefineErrorDefinition").with_options(json!({"codes": ["400", "422", "4XX"]})),
            "Extend the responses of all endpoints to support either 400, 422, or 4XX error codes.",
        ),
        owasp(
            OWASP_RATE_LIMIT,
            "`2XX` and `4XX` responses should define rate limiting headers",
            "Define proper rate limiting to avoid attackers overloading the API.",
            Severity::Error,
            RuleAction::new("owaspHeaderDefinition").with_options(json!({ "headers": rate_limit_headers() })),
            "Implement rate-limiting using HTTP headers: https://datatracker.ietf.org/doc/draft-ietf-httpapi-ratelimit-headers/ Customer headers like X-Rate-Limit-Limit or X-RateLimit-Limit",
        )
        .with_formats(&[Format::Oas3]),
        simple(
            OWASP_RATE_LIMIT_RETRY_AFTER,
            "A `429` response should define a `Retry-After` header",
            "Ensure that any `429` response, contains a `Retry-After` header.",
            Severity::Error,
            "owaspRatelimitRetryAfter",
            "Set the Retry-After header in the 429 response.",
        )
        .with_formats(&[Format::Oas3]),
        simple(
            OWASP_NO_NUMERIC_IDS,
            "Use random IDs that cannot be guessed",
            "Use random IDs that cannot be guessed. UUIDs are preferred",
            Severity::Error,
            "owaspNoNumericIDs",
            "For any parameter which ends in id, use type string with uuid format instead of type integer.",
        ),
        simple(
            OWASP_NO_HTTP_BASIC,
            "Security scheme uses HTTP Basic",
            "Security scheme uses HTTP Basic. Use a more secure authentication method, like OAuth 2.0",
            Severity::Error,
            "owaspNoBasicAuth",
            "Do not use basic authentication method, use a more secure authentication method (e.g., bearer).",
        ),
        simple(
            OWASP_NO_API_KEYS_IN_URL,
            "API Key passed in URL",
            "API Key has been detected in a URL",
            Severity::Error,
            "owaspNoApiKeysInUrl",
            "Make sure that the apiKey is not part of the URL (path or query): https://blog.stoplight.io/api-keys-best-practices-to-authenticate-apis",
        )
        .with_formats(&[Format::Oas3]),
        simple(
            OWASP_NO_CREDENTIALS_IN_URL,
            "Credentials passed in URL",
            "URL parameters must not contain credentials such as API key, password, or secret.",
            Severity::Error,
            "owaspNoCredentialsInUrl",
            "Remove credentials from the URL.",
        )
        .with_formats(&[Format::Oas3]),
        simple(
            OWASP_AUTH_INSECURE_SCHEMES,
            "Authentication scheme is insecure",
            "Authentication scheme is considered outdated or insecure",
            Severity::Error,
            "owaspAuthInsecureSchemes",
            "Use a different authorization scheme. Refer to https://www.iana.org/assignments/http-authschemes/ to know more about HTTP Authentication Schemes.",
        )
        .with_formats(&[Format::Oas3]),
        simple(
            OWASP_JWT_BEST_PRACTICES,
            "Security schemes using JWTs must explicitly declare support for RFC8725",
            "JWTs must explicitly declare support for RFC8725 in the description",
            Severity::Error,
            "owaspJWTBestPractice",
            "Explicitly state, in the description of the security schemes, that it allows for support of the RFC8725: https://datatracker.ietf.org/doc/html/rfc8725.",
        ),
        simple(
            OWASP_ARRAY_LIMIT,
            "Schema of type array must specify maxItems",
            "Array size should be limited to mitigate resource exhaustion attacks.",
            Severity::Error,
            "owaspArrayLimit",
            "Add `maxItems` for Schema of type 'array'. You should ensure that the subschema in `items` is constrained too.",
        ),
        simple(
            OWASP_STRING_LIMIT,
            "String must specify maxLength, enum, or const",
            "String size should be limited to mitigate resource exhaustion attacks.",
            Severity::Error,
            "owaspStringLimit",
            "Use `maxLength`, `enum`, or `const`.",
        ),
        simple(
            OWASP_STRING_RESTRICTED,
            "String must specify a format, pattern, enum, or const",
            "String must specify a `format`, RegEx `pattern`, `enum`, or `const`",
            Severity::Error,
            "owaspStringRestricted",
            "Ensure that strings have either a `format`, RegEx `pattern`, `enum`, or `const`.",
        ),
        simple(
            OWASP_INTEGER_LIMIT,
            "Integers must specify minimum and maximum",
            "Integers should be limited via min/max values to mitigate resource exhaustion attacks.",
            Severity::Error,
            "owaspIntegerLimit",
            "Use `minimum` and `maximum` properties for integer types: avoiding negative numbers when positive are expected, or reducing unreasonable iterations like doing something 1000 times when 10 is expected.",
        ),
        simple(
            OWASP_INTEGER_FORMAT,
            "Integers must specify int32 or int64",
            "Integers should be limited to mitigate resource exhaustion attacks.",
            Severity::Error,
            "owaspIntegerFormat",
            "Specify whether int32 or int64 is expected via `format`.",
        ),
        simple(
            OWASP_NO_ADDITIONAL_PROPERTIES,
            "If the additionalProperties keyword is used it must be set to false",
            "By default JSON Schema allows additional properties, which can potentially lead to mass assignment issues.",
            Severity::Warn,
            "owaspNoAdditionalProperties",
            "Disable additional properties by setting `additionalProperties` to `false` or add `maxProperties`.",
        ),
        simple(
            OWASP_CONSTRAINED_ADDITIONAL_PROPERTIES,
            "Objects should not allow unconstrained additionalProperties",
            "By default JSON Schema allows additional properties, which can potentially lead to mass assignment issues.",
            Severity::Warn,
            "owaspAdditionalPropertiesConstrained",
            "Disable additional properties by setting `additionalProperties` to `false` or add `maxProperties`.",
        )
        .with_formats(&[Format::Oas3]),
        simple(
            OWASP_SECURITY_HOSTS_HTTPS_OAS3,
            "Server URLs must use the https protocol",
            "All server interactions MUST use the https protocol, meaning server URLs should begin `https://`.",
            Severity::Error,
            "owaspSecurityHostsHttpsOas3",
            "Prefix server URLs with the HTTPS protocol: `https://`.",
        )
        .with_formats(&[Format::Oas3]),
    ];
    rules.into_iter().map(|r| (r.id.clone(), r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionRegistry;
    use crate::model::validate_options;

    #[test]
    fn test_owasp_rules() {
        let rules = owasp_rules();
        assert_eq!(rules.len(), 23);
        assert!(rules.contains_key(OWASP_DEFINE_ERROR_RESPONSES_401));
        assert!(rules.contains_key(OWASP_DEFINE_ERROR_RESPONSES_429));

        let registry = FunctionRegistry::builtin();
        for (id, rule) in &rules {
            assert_eq!(rule.category_id(), CATEGORY_OWASP);
            let action = rule.then.actions()[0];
            let function = registry.find(&action.function).unwrap();
            assert!(validate_options(&function.schema(), &action.options(), action).is_ok(), "{}", id);
        }
    }

    #[test]
    fn test_check_security_options() {
        let rules = owasp_rules();
        let strict = &rules[OWASP_PROTECTION_GLOBAL_UNSAFE_STRICT];
        let options = strict.then.actions()[0].options();
        assert_eq!(options["nullable"], json!(false));
        assert_eq!(strict.severity, Severity::Info);
    }
}
