//! Built-in OpenAPI rules

use crate::model::category::{
    CATEGORY_DESCRIPTIONS, CATEGORY_EXAMPLES, CATEGORY_INFO, CATEGORY_OPERATIONS, CATEGORY_SCHEMAS,
    CATEGORY_SECURITY, CATEGORY_TAGS, CATEGORY_VALIDATION,
};
use crate::model::{Rule, RuleAction, Severity};
use crate::spec_info::Format;
use indexmap::IndexMap;
use serde_json::json;

pub const OPERATION_SUCCESS_RESPONSE: &str = "operation-success-response";
pub const OPERATION_OPERATION_ID_UNIQUE: &str = "operation-operationId-unique";
pub const OPERATION_OPERATION_ID: &str = "operation-operationId";
pub const OPERATION_PARAMETERS: &str = "operation-parameters";
pub const OPERATION_SINGULAR_TAG: &str = "operation-singular-tag";
pub const OPERATION_TAG_DEFINED: &str = "operation-tag-defined";
pub const PATH_PARAMS: &str = "path-params";
pub const CONTACT_PROPERTIES: &str = "contact-properties";
pub const INFO_CONTACT: &str = "info-contact";
pub const INFO_DESCRIPTION: &str = "info-description";
pub const INFO_LICENSE: &str = "info-license";
pub const INFO_LICENSE_SPDX: &str = "info-license-spdx";
pub const LICENSE_URL: &str = "license-url";
pub const OPENAPI_TAGS_ALPHABETICAL: &str = "openapi-tags-alphabetical";
pub const OPENAPI_TAGS: &str = "openapi-tags";
pub const OPERATION_TAGS: &str = "operation-tags";
pub const OPERATION_DESCRIPTION: &str = "operation-description";
pub const COMPONENT_DESCRIPTION: &str = "component-description";
pub const OPERATION_ID_VALID_IN_URL: &str = "operation-operationId-valid-in-url";
pub const PATH_DECLARATIONS_MUST_EXIST: &str = "path-declarations-must-exist";
pub const PATH_KEYS_NO_TRAILING_SLASH: &str = "path-keys-no-trailing-slash";
pub const PATH_NOT_INCLUDE_QUERY: &str = "path-not-include-query";
pub const TAG_DESCRIPTION: &str = "tag-description";
pub const NO_REF_SIBLINGS: &str = "no-$ref-siblings";
pub const OAS3_UNUSED_COMPONENT: &str = "oas3-unused-component";
pub const OAS2_UNUSED_DEFINITION: &str = "oas2-unused-definition";
pub const OAS2_API_HOST: &str = "oas2-api-host";
pub const OAS2_API_SCHEMES: &str = "oas2-api-schemes";
pub const OAS2_DISCRIMINATOR: &str = "oas2-discriminator";
pub const OAS2_HOST_NOT_EXAMPLE: &str = "oas2-host-not-example";
pub const OAS3_HOST_NOT_EXAMPLE: &str = "oas3-host-not-example";
pub const OAS2_HOST_TRAILING_SLASH: &str = "oas2-host-trailing-slash";
pub const OAS3_HOST_TRAILING_SLASH: &str = "oas3-server-trailing-slash";
pub const OAS2_PARAMETER_DESCRIPTION: &str = "oas2-parameter-description";
pub const OAS3_PARAMETER_DESCRIPTION: &str = "oas3-parameter-description";
pub const OAS3_OPERATION_SECURITY_DEFINED: &str = "oas3-operation-security-defined";
pub const OAS2_OPERATION_SECURITY_DEFINED: &str = "oas2-operation-security-defined";
pub const TYPED_ENUM: &str = "typed-enum";
pub const DUPLICATED_ENTRY_IN_ENUM: &str = "duplicated-entry-in-enum";
pub const NO_EVAL_IN_MARKDOWN: &str = "no-eval-in-markdown";
pub const NO_SCRIPT_TAGS_IN_MARKDOWN: &str = "no-script-tags-in-markdown";
pub const DESCRIPTION_DUPLICATION: &str = "description-duplication";
pub const OAS3_API_SERVERS: &str = "oas3-api-servers";
pub const OAS2_FORM_DATA_CONSUME_CHECK: &str = "oas2-operation-formData-consume-check";
pub const OAS2_ANY_OF: &str = "oas2-anyOf";
pub const OAS2_ONE_OF: &str = "oas2-oneOf";
pub const NO_AMBIGUOUS_PATHS: &str = "no-ambiguous-paths";
pub const NO_VERBS_IN_PATH: &str = "no-http-verbs-in-path";
pub const PATHS_KEBAB_CASE: &str = "paths-kebab-case";
pub const OPERATION_ERROR_RESPONSE: &str = "operation-4xx-response";
pub const OAS2_SCHEMA: &str = "oas2-schema";
pub const OAS3_SCHEMA: &str = "oas3-schema";
pub const OAS3_VALID_SCHEMA_EXAMPLE: &str = "oas3-valid-schema-example";
pub const OAS3_MISSING_EXAMPLE: &str = "oas3-missing-example";
pub const OAS_SCHEMA_CHECK: &str = "oas-schema-check";
pub const POST_RESPONSE_SUCCESS: &str = "post-response-success";
pub const NO_REQUEST_BODY: &str = "no-request-body";

const OAS2: &[Format] = &[Format::Oas2];
const OAS3: &[Format] = &[Format::Oas3];

fn documented(mut rule: Rule) -> Rule {
    rule.documentation_url = format!(
        "https://quobix.com/vacuum/rules/{}/{}",
        rule.category_id(),
        rule.id.replace('$', "")
    );
    rule
}

/// A rule running a single function over `given`
fn rule(id: &str, description: &str, given: &str, action: RuleAction) -> Rule {
    Rule::new(id)
        .with_name(description)
        .with_description(description)
        .with_given(given)
        .with_then(action)
}

fn info_rules() -> Vec<Rule> {
    vec![
        Rule::new(CONTACT_PROPERTIES)
            .with_name("Contact details are incomplete")
            .with_description("Contact details are incomplete")
            .with_given("$.info.contact")
            .with_then(vec![
                RuleAction::new("truthy").with_field("name"),
                RuleAction::new("truthy").with_field("url"),
                RuleAction::new("truthy").with_field("email"),
            ])
            .with_severity(Severity::Info)
            .with_category(CATEGORY_INFO)
            .with_how_to_fix(
                "Complete specification contact information. Fill in the 'name', 'url' and 'email' properties so consumers of the spec know how to reach you.",
            ),
        rule(INFO_CONTACT, "Info section is missing contact details", "$.info", RuleAction::new("truthy").with_field("contact"))
            .with_severity(Severity::Warn)
            .with_category(CATEGORY_INFO)
            .recommended()
            .with_how_to_fix(
                "The specification 'info' section doesn't contain a 'contact' object. Add it and make sure to complete 'name', 'url' and 'email' properties so consumers of the spec know how to reach you.",
            ),
        rule(INFO_DESCRIPTION, "Info section is missing a description", "$.info", RuleAction::new("truthy").with_field("description"))
            .with_severity(Severity::Error)
            .with_category(CATEGORY_INFO)
            .recommended()
            .with_how_to_fix(
                "The 'info' section is missing a description, surely you want people to know what this spec is all about, right?",
            ),
        rule(INFO_LICENSE, "Info section should contain a license", "$.info", RuleAction::new("truthy").with_field("license"))
            .with_severity(Severity::Info)
            .with_category(CATEGORY_INFO)
            .with_how_to_fix("The 'info' section is missing a 'license' object. Please add an appropriate one"),
        rule(LICENSE_URL, "License should contain a URL", "$.info.license", RuleAction::new("truthy").with_field("url"))
            .with_severity(Severity::Info)
            .with_category(CATEGORY_INFO)
            .with_how_to_fix(
                "The 'info' section license URL is missing. If you add a license, you need to make sure that you link to an appropriate URL for that license.",
            ),
        rule(
            INFO_LICENSE_SPDX,
            "License section cannot contain both an identifier and a URL, they are mutually exclusive.",
            "$.info.license",
            RuleAction::new("xor").with_options(json!({"properties": ["identifier", "url"]})),
        )
        .with_formats(&[Format::Oas31])
        .with_severity(Severity::Error)
        .with_category(CATEGORY_INFO)
        .recommended()
        .with_how_to_fix(
            "A license can contain either a URL or an SPDX identifier, but not both, They are mutually exclusive and cannot both be present. Choose one or the other",
        ),
        rule(OAS2_API_HOST, "OpenAPI `host` must be present and a non-empty string", "$", RuleAction::new("truthy").with_field("host"))
            .with_formats(OAS2)
            .with_severity(Severity::Warn)
            .with_category(CATEGORY_INFO)
            .recommended()
            .with_how_to_fix(
                "The 'host' value is missing. How is a user supposed to know where the API actually lives? The host is critical in order for consumers to be able to call the API. Add an API host!",
            ),
        rule(
            OAS2_API_SCHEMES,
            "OpenAPI host `schemes` must be present and non-empty array",
            "$",
            RuleAction::new("schema").with_field("schemes").with_options(json!({
                "schema": {"type": "array", "minItems": 1, "items": {"type": "string"}},
                "forceValidation": true
            })),
        )
        .with_formats(OAS2)
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_INFO)
        .recommended()
        .with_how_to_fix(
            "Add an array of supported host 'schemes' to the root of the specification. These are the available API schemes (like https/http).",
        ),
        rule(
            OAS2_HOST_NOT_EXAMPLE,
            "Host URL should not point at example.com",
            "$",
            RuleAction::new("pattern").with_field("host").with_options(json!({"notMatch": "example\\.com"})),
        )
        .with_formats(OAS2)
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_INFO)
        .with_how_to_fix("Remove 'example.com' from the host URL, it's not going to work."),
        rule(
            OAS3_HOST_NOT_EXAMPLE,
            "Server URL should not point at example.com",
            "$.servers[*]",
            RuleAction::new("pattern").with_field("url").with_options(json!({"notMatch": "example\\.com"})),
        )
        .with_formats(OAS3)
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_INFO)
        .with_how_to_fix("Remove 'example.com' from the 'servers' URL, it's not going to work."),
        rule(
            OAS2_HOST_TRAILING_SLASH,
            "Host URL should not end with a slash",
            "$",
            RuleAction::new("pattern").with_field("host").with_options(json!({"notMatch": "/$"})),
        )
        .with_formats(OAS2)
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_INFO)
        .recommended()
        .with_how_to_fix(
            "Remove the trailing slash from the host URL. This may cause some tools to incorrectly add a double slash to paths.",
        ),
        rule(
            OAS3_HOST_TRAILING_SLASH,
            "Server URL should not have a trailing slash",
            "$.servers[*]",
            RuleAction::new("pattern").with_field("url").with_options(json!({"notMatch": "./$"})),
        )
        .with_formats(OAS3)
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_INFO)
        .recommended()
        .with_how_to_fix(
            "Remove the trailing slash from the server URL. This may cause some tools to incorrectly add a double slash to paths.",
        ),
        rule(OAS3_API_SERVERS, "Check for valid API servers definition", "$", RuleAction::new("oasAPIServers"))
            .with_formats(OAS3)
            .with_severity(Severity::Warn)
            .with_category(CATEGORY_INFO)
            .recommended()
            .with_how_to_fix("Ensure server URIs are correct and valid, check the schemes, ensure descriptions are complete."),
    ]
}

fn operation_rules() -> Vec<Rule> {
    vec![
        rule(
            OPERATION_SUCCESS_RESPONSE,
            "Operation must have at least one `2xx` or a `3xx` response.",
            "$",
            RuleAction::new("oasOpSuccessResponse"),
        )
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_OPERATIONS)
        .recommended()
        .with_how_to_fix(
            "Make sure that your operation returns a 'success' response via 2xx or 3xx response code. An API consumer will always expect a success response",
        ),
        rule(
            OPERATION_OPERATION_ID_UNIQUE,
            "Every operation must have unique \"operationId\".",
            "$",
            RuleAction::new("oasOpIdUnique"),
        )
        .with_severity(Severity::Error)
        .with_category(CATEGORY_OPERATIONS)
        .recommended()
        .with_how_to_fix(
            "An operationId needs to be unique, there can't be any duplicates in the document, you can't re-use them. Make sure the ID used for this operation is unique.",
        ),
        rule(OPERATION_OPERATION_ID, "Every operation must contain an `operationId`.", "$", RuleAction::new("oasOpId"))
            .with_severity(Severity::Warn)
            .with_category(CATEGORY_OPERATIONS)
            .recommended()
            .with_how_to_fix(
                "Every single operation needs an operationId. It's a critical requirement to be able to identify each individual operation uniquely. Please add an operationId to the operation.",
            ),
        rule(
            OPERATION_PARAMETERS,
            "Operation parameters are unique and non-repeating.",
            "$",
            RuleAction::new("oasOpParams"),
        )
        .with_severity(Severity::Error)
        .with_category(CATEGORY_OPERATIONS)
        .recommended()
        .with_how_to_fix(
            "Make sure that all the operation parameters are unique and non-repeating, don't duplicate names, don't re-use parameter names in the same operation.",
        ),
        rule(PATH_PARAMS, "Path parameters must be defined and valid.", "$", RuleAction::new("oasPathParam"))
            .with_severity(Severity::Error)
            .with_category(CATEGORY_OPERATIONS)
            .recommended()
            .with_how_to_fix(
                "Path parameters need to match up with the parameters defined for the path, or in an operation that sits under that path. Make sure variable names match up and are defined correctly.",
            ),
        rule(
            OPERATION_ID_VALID_IN_URL,
            "OperationId must use URL friendly characters",
            "$.paths[*][*]",
            RuleAction::new("pattern")
                .with_field("operationId")
                .with_options(json!({"match": "^[A-Za-z0-9-._~:/?#\\[\\]@!\\$&'()*+,;=]*$"})),
        )
        .with_severity(Severity::Error)
        .with_category(CATEGORY_OPERATIONS)
        .recommended()
        .with_how_to_fix(
            "An operationId is critical to correct code generation and operation identification. The operationId should really be designed in a way to make it friendly when used as part of a URL. Remove non-standard URL characters.",
        ),
        rule(
            PATH_DECLARATIONS_MUST_EXIST,
            "Path parameter declarations must not be empty ex. `/api/{}` is invalid",
            "$.paths[?(@property =~ /\\{\\}/)]",
            RuleAction::new("falsy"),
        )
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_OPERATIONS)
        .recommended()
        .with_how_to_fix(
            "Paths define the endpoint for operations. Without paths, there is no API. You need to add 'paths' to the root of the specification.",
        ),
        rule(
            PATH_KEYS_NO_TRAILING_SLASH,
            "Path must not end with a slash",
            "$.paths[?(@property =~ /.+\\/$/)]",
            RuleAction::new("falsy"),
        )
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_OPERATIONS)
        .recommended()
        .with_how_to_fix(
            "Paths should not end with a trailing slash, it can confuse tooling and isn't valid as a path Remove the trailing slash from the path.",
        ),
        rule(
            PATH_NOT_INCLUDE_QUERY,
            "Path must not include query string",
            "$.paths[?(@property =~ /\\?/)]",
            RuleAction::new("falsy"),
        )
        .with_severity(Severity::Error)
        .with_category(CATEGORY_OPERATIONS)
        .recommended()
        .with_how_to_fix(
            "Query strings are defined as parameters for an operation, they should not be included in the path Please remove it and correctly define as a parameter.",
        ),
        rule(
            OAS2_FORM_DATA_CONSUME_CHECK,
            "Operations with `in: formData` parameter must include `application/x-www-form-urlencoded` or `multipart/form-data` in their `consumes` property.",
            "$",
            RuleAction::new("oasOpFormDataConsumeCheck"),
        )
        .with_formats(OAS2)
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_OPERATIONS)
        .recommended()
        .with_how_to_fix(
            "When using 'formData', the parameter must include the correct mime-types. Make sure you use 'application/x-www-form-urlencoded' or 'multipart/form-data' as the 'consumes' value in your parameter.",
        ),
        rule(NO_AMBIGUOUS_PATHS, "Paths need to resolve unambiguously from one another", "$", RuleAction::new("noAmbiguousPaths"))
            .with_severity(Severity::Error)
            .with_category(CATEGORY_OPERATIONS)
            .recommended()
            .with_how_to_fix(
                "Paths must all resolve unambiguously, they can't be confused with one another (/{id}/ambiguous and /ambiguous/{id} are the same thing. Make sure every path and the variables used are unique and do conflict with one another. Check the ordering of variables and the naming of path segments.",
            ),
        rule(NO_VERBS_IN_PATH, "Path segments must not contain an HTTP verb", "$", RuleAction::new("noVerbsInPath"))
            .with_severity(Severity::Warn)
            .with_category(CATEGORY_OPERATIONS)
            .with_how_to_fix(
                "When HTTP verbs (get/post/put etc) are used in path segments, it muddies the semantics of REST and creates a confusing and inconsistent experience. It's highly recommended that verbs are not used in path segments. Replace those HTTP verbs with more meaningful nouns.",
            ),
        rule(PATHS_KEBAB_CASE, "Path segments must only use kebab-case (no underscores or uppercase)", "$", RuleAction::new("pathsKebabCase"))
            .with_severity(Severity::Warn)
            .with_category(CATEGORY_OPERATIONS)
            .with_how_to_fix(
                "Path segments should not contain any uppercase letters, punctuation or underscores. The only valid way to separate words in a segment, is to use a hyphen '-'. The elements that are violating the rule are highlighted in the violation description. These are the elements that need to change.",
            ),
        rule(
            OPERATION_ERROR_RESPONSE,
            "Make sure operations return at least one `4xx` error response to help with bad requests",
            "$",
            RuleAction::new("oasOpErrorResponse"),
        )
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_OPERATIONS)
        .recommended()
        .with_how_to_fix(
            "Make sure each operation defines at least one 4xx error response. 4xx Errors are used to inform clients they are using the API incorrectly, with bad input, or malformed requests. An API with no errors defined is really hard to navigate.",
        ),
        rule(
            POST_RESPONSE_SUCCESS,
            "Check for valid POST success responses",
            "$.paths[*].post.responses",
            RuleAction::new("oasPostResponseSuccess")
                .with_options(json!({"properties": ["200", "201", "202", "204"]})),
        )
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_OPERATIONS)
        .with_how_to_fix("Make sure your POST operations return a 'success' response via 2xx or 3xx response code."),
        rule(
            NO_REQUEST_BODY,
            "HTTP GET and DELETE methods must not accept request bodies",
            "$",
            RuleAction::new("noRequestBody"),
        )
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_OPERATIONS)
        .recommended()
        .with_how_to_fix("Remove the request body from the GET or DELETE operation, servers and proxies are free to ignore it."),
    ]
}

fn tag_rules() -> Vec<Rule> {
    vec![
        rule(OPERATION_SINGULAR_TAG, "Operation cannot have more than a single tag defined", "$", RuleAction::new("oasOpSingleTag"))
            .with_severity(Severity::Warn)
            .with_category(CATEGORY_TAGS)
            .with_how_to_fix(
                "Using tags as 'groups' for operations makes a lot of sense. It stops making sense when multiple tags are used for an operation. Reduce tag count down to one for the operation.",
            ),
        rule(OPERATION_TAG_DEFINED, "Operation tags must be defined in global tags.", "$", RuleAction::new("oasTagDefined"))
            .with_severity(Severity::Warn)
            .with_category(CATEGORY_TAGS)
            .recommended()
            .with_how_to_fix(
                "This tag has not been defined in the global scope, you should always ensure that any tags used in operations, are defined globally in the root 'tags' definition.",
            ),
        rule(
            OPENAPI_TAGS_ALPHABETICAL,
            "Tags must be in alphabetical order",
            "$",
            RuleAction::new("alphabetical").with_field("tags").with_options(json!({"keyedBy": "name"})),
        )
        .with_severity(Severity::Info)
        .with_category(CATEGORY_TAGS)
        .with_how_to_fix(
            "The global tags defined in the spec are not listed alphabetically, Everything is much better when data is pre-sorted. Order the tags in alphabetical sequence.",
        ),
        rule(
            OPENAPI_TAGS,
            "Top level spec `tags` must not be empty, and must be an array",
            "$",
            RuleAction::new("schema").with_field("tags").with_options(json!({
                "schema": {"type": "array", "minItems": 1},
                "forceValidation": true
            })),
        )
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_TAGS)
        .with_how_to_fix(
            "Add a global 'tags' object to the root of the spec. Global tags are used by operations to define taxonomy and information architecture by tools. Tags generate navigation in documentation as well as modules in code generation.",
        ),
        rule(OPERATION_TAGS, "Operation `tags` are missing/empty", "$", RuleAction::new("oasOperationTags"))
            .with_severity(Severity::Warn)
            .with_category(CATEGORY_TAGS)
            .recommended()
            .with_how_to_fix(
                "Operations use tags to define the domain(s) they are apart of. Generally a single tag per operation is used, however some tools use multiple tags. The point is that you need tags! Add some tags to the operation that match the globally available ones.",
            ),
        rule(TAG_DESCRIPTION, "Tag must have a description defined", "$.tags[*]", RuleAction::new("truthy").with_field("description"))
            .with_severity(Severity::Warn)
            .with_category(CATEGORY_TAGS)
            .recommended()
            .with_how_to_fix(
                "Tags are used to group operations into meaningful domains. Without a description, how is anyone supposed to understand what the grouping means? Add a description to your global tag.",
            ),
    ]
}

fn description_rules() -> Vec<Rule> {
    let parameter_description = |id: &str, formats: &[Format]| {
        rule(id, "Parameter description checks", "$", RuleAction::new("oasParamDescriptions"))
            .with_formats(formats)
            .with_severity(Severity::Warn)
            .with_category(CATEGORY_DESCRIPTIONS)
            .recommended()
            .with_how_to_fix(
                "All parameters should have a description. Descriptions are critical to understanding how an API works correctly. Please add a description to all parameters.",
            )
    };
    vec![
        rule(
            OPERATION_DESCRIPTION,
            "Operation description checks",
            "$",
            RuleAction::new("oasDescriptions").with_options(json!({"minWords": 1})),
        )
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_DESCRIPTIONS)
        .recommended()
        .with_how_to_fix(
            "All operations must have a description. Descriptions explain how the operation works, and how users should use it and what to expect. Operation descriptions make up the bulk of API documentation. so please, add a description!",
        ),
        rule(COMPONENT_DESCRIPTION, "Component description check", "$", RuleAction::new("oasComponentDescriptions"))
            .with_formats(OAS3)
            .with_severity(Severity::Warn)
            .with_category(CATEGORY_DESCRIPTIONS)
            .recommended()
            .with_how_to_fix(
                "Components are the inputs and outputs of a specification. A user needs to be able to understand each component and what id does. Descriptions are critical to understanding components. Add a description!",
            ),
        parameter_description(OAS2_PARAMETER_DESCRIPTION, OAS2),
        parameter_description(OAS3_PARAMETER_DESCRIPTION, OAS3),
        rule(
            NO_EVAL_IN_MARKDOWN,
            "Markdown descriptions must not have `eval()` statements'",
            "$",
            RuleAction::new("noEvalDescription").with_options(json!({"pattern": "eval\\("})),
        )
        .with_severity(Severity::Error)
        .with_category(CATEGORY_DESCRIPTIONS)
        .recommended()
        .with_how_to_fix(
            "Remove all references to 'eval()' in the description. These can be used by malicious actors to embed code in contracts that is then executed when read by a browser.",
        ),
        rule(
            NO_SCRIPT_TAGS_IN_MARKDOWN,
            "Markdown descriptions must not have `<script>` tags'",
            "$",
            RuleAction::new("noEvalDescription").with_options(json!({"pattern": "<script"})),
        )
        .with_severity(Severity::Error)
        .with_category(CATEGORY_DESCRIPTIONS)
        .recommended()
        .with_how_to_fix(
            "Remove all references to '<script>' tags from the description. These can be used by malicious actors to load remote code if the spec is being parsed by a browser.",
        ),
        rule(
            DESCRIPTION_DUPLICATION,
            "Description duplication check",
            "$",
            RuleAction::new("oasDescriptionDuplication"),
        )
        .with_severity(Severity::Info)
        .with_category(CATEGORY_DESCRIPTIONS)
        .recommended()
        .with_how_to_fix(
            "Descriptions are only useful, if they are meaningful. If a description is meaningful, then it won't be something you copy and paste. Please don't duplicate descriptions, make them deliberate and meaningful.",
        ),
    ]
}

fn schema_rules() -> Vec<Rule> {
    let unused = |id: &str, formats: &[Format]| {
        rule(id, "Check for unused components and bad references", "$", RuleAction::new("oasUnusedComponent"))
            .with_formats(formats)
            .with_severity(Severity::Warn)
            .with_category(CATEGORY_SCHEMAS)
            .recommended()
            .unresolved()
            .with_how_to_fix(
                "Unused components / definitions are generally the result of the OpenAPI contract being updated without considering references. Remove this component from the spec, or re-link to it from another component or operation to fix the problem.",
            )
    };
    let polymorphic = |id: &str, keyword: &str| {
        let description = format!(
            "`{}` was introduced in OpenAPI 3.0, cannot be used in OpenAPI 2 specs",
            keyword
        );
        rule(
            id,
            &description,
            &format!("$..[?(@.{})]", keyword),
            RuleAction::new("undefined").with_field(keyword),
        )
        .with_formats(OAS2)
        .with_severity(Severity::Error)
        .with_category(CATEGORY_SCHEMAS)
        .recommended()
        .with_how_to_fix(&format!(
            "You can't use '{}' in Swagger/OpenAPI 2 specs. It was added in version 3. You have to remove it",
            keyword
        ))
    };
    vec![
        rule(
            NO_REF_SIBLINGS,
            "$ref values cannot be placed next to other properties (like a description)",
            "$",
            RuleAction::new("refSiblings"),
        )
        .with_formats(&[Format::Oas2, Format::Oas30])
        .with_severity(Severity::Error)
        .with_category(CATEGORY_SCHEMAS)
        .recommended()
        .unresolved()
        .with_how_to_fix(
            "$ref values must not be placed next to sibling nodes, There should only be a single node when using $ref. A common mistake is adding 'description' next to a $ref. This is wrong. remove all siblings!",
        ),
        unused(OAS3_UNUSED_COMPONENT, OAS3),
        unused(OAS2_UNUSED_DEFINITION, OAS2),
        rule(
            OAS2_DISCRIMINATOR,
            "discriminator property must be defined and required",
            "$",
            RuleAction::new("oasDiscriminator"),
        )
        .with_formats(OAS2)
        .with_severity(Severity::Error)
        .with_category(CATEGORY_SCHEMAS)
        .recommended()
        .with_how_to_fix(
            "When using polymorphism, a discriminator should also be provided to allow tools to understand how to compose your models when generating code. Add a correct discriminator.",
        ),
        rule(TYPED_ENUM, "Enum values must respect the specified type", "$", RuleAction::new("typedEnum"))
            .with_severity(Severity::Warn)
            .with_category(CATEGORY_SCHEMAS)
            .recommended()
            .with_how_to_fix(
                "Enum values lock down the number of variable inputs a parameter or schema can have. The problem here is that the Enum defined, does not match the specified type. Fix the type!",
            ),
        rule(DUPLICATED_ENTRY_IN_ENUM, "Enum values must not have duplicate entry", "$", RuleAction::new("duplicatedEnum"))
            .with_severity(Severity::Error)
            .with_category(CATEGORY_SCHEMAS)
            .recommended()
            .with_how_to_fix(
                "Enums need to be unique, you can't duplicate them in the same definition. Please remove the duplicate value.",
            ),
        polymorphic(OAS2_ANY_OF, "anyOf"),
        polymorphic(OAS2_ONE_OF, "oneOf"),
        rule(OAS_SCHEMA_CHECK, "All document schemas must have a valid type defined", "$", RuleAction::new("schemaTypeCheck"))
            .with_severity(Severity::Error)
            .with_category(CATEGORY_SCHEMAS)
            .recommended()
            .with_how_to_fix("Make sure each schema has a value type defined. Without a type, the schema is useless"),
    ]
}

fn validation_rules() -> Vec<Rule> {
    vec![
        rule(OAS2_SCHEMA, "OpenAPI 2 specification is invalid", "$", RuleAction::new("oasSchema"))
            .with_formats(OAS2)
            .with_severity(Severity::Error)
            .with_category(CATEGORY_VALIDATION)
            .recommended()
            .with_how_to_fix("The schema isn't valid Swagger/OpenAPI 2. Check the errors for more details"),
        rule(OAS3_SCHEMA, "OpenAPI 3+ specification is invalid", "$", RuleAction::new("oasSchema"))
            .with_formats(OAS3)
            .with_severity(Severity::Error)
            .with_category(CATEGORY_VALIDATION)
            .recommended()
            .with_how_to_fix("The schema isn't valid OpenAPI 3. Check the errors for more details"),
    ]
}

fn security_rules() -> Vec<Rule> {
    vec![
        rule(
            OAS3_OPERATION_SECURITY_DEFINED,
            "`security` values must match a scheme defined in components.securitySchemes",
            "$",
            RuleAction::new("oasOpSecurityDefined")
                .with_options(json!({"schemesPath": "$.components.securitySchemes"})),
        )
        .with_formats(OAS3)
        .with_severity(Severity::Error)
        .with_category(CATEGORY_SECURITY)
        .recommended()
        .with_how_to_fix(
            "When defining security values for operations, you need to ensure they match the globally defined security schemes. Check $.components.securitySchemes to make sure your values align.",
        ),
        rule(
            OAS2_OPERATION_SECURITY_DEFINED,
            "`security` values must match a scheme defined in securityDefinitions",
            "$",
            RuleAction::new("oas2OpSecurityDefined")
                .with_options(json!({"schemesPath": "$.securityDefinitions"})),
        )
        .with_formats(OAS2)
        .with_severity(Severity::Error)
        .with_category(CATEGORY_SECURITY)
        .recommended()
        .with_how_to_fix(
            "When defining security definitions for operations, you need to ensure they match the globally defined security schemes. Check $.securityDefinitions to make sure your values align.",
        ),
    ]
}

fn example_rules() -> Vec<Rule> {
    let fix = "Examples are critical for consumers to be able to understand schemas and models defined by the spec. Without examples, developers can't understand the type of data the API will return in real life. Add detailed examples everywhere!";
    vec![
        rule(
            OAS3_VALID_SCHEMA_EXAMPLE,
            "If an example has been used, check the schema is valid",
            "$",
            RuleAction::new("oasExampleSchema"),
        )
        .with_formats(OAS3)
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_EXAMPLES)
        .recommended()
        .with_how_to_fix(fix),
        rule(
            OAS3_MISSING_EXAMPLE,
            "Ensure everything that can have an example, contains one",
            "$",
            RuleAction::new("oasExampleMissing"),
        )
        .with_formats(OAS3)
        .with_severity(Severity::Warn)
        .with_category(CATEGORY_EXAMPLES)
        .recommended()
        .with_how_to_fix(fix),
    ]
}

/// Every built-in OpenAPI rule, keyed by id
pub fn openapi_rules() -> IndexMap<String, Rule> {
    info_rules()
        .into_iter()
        .chain(operation_rules())
        .chain(tag_rules())
        .chain(description_rules())
        .chain(schema_rules())
        .chain(validation_rules())
        .chain(security_rules())
        .chain(example_rules())
        .map(|r| {
            let r = documented(r);
            (r.id.clone(), r)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionRegistry;
    use crate::jsonpath::JsonPath;
    use crate::model::validate_options;

    #[test]
    fn test_rules_reference_registered_functions() {
        let registry = FunctionRegistry::builtin();
        for (id, rule) in openapi_rules() {
            for action in rule.then.actions() {
                let function = registry
                    .find(&action.function)
                    .unwrap_or_else(|| panic!("{} uses unknown function {}", id, action.function));
                assert!(
                    validate_options(&function.schema(), &action.options(), action).is_ok(),
                    "{} has invalid options",
                    id
                );
            }
        }
    }

    #[test]
    fn test_givens_compile() {
        for (id, rule) in openapi_rules() {
            for given in rule.given.paths() {
                assert!(JsonPath::compile(given).is_ok(), "{}: {}", id, given);
            }
        }
    }

    #[test]
    fn test_rule_metadata() {
        let rules = openapi_rules();
        let info = &rules[INFO_DESCRIPTION];
        assert_eq!(info.category_id(), CATEGORY_INFO);
        assert!(info.recommended);
        assert_eq!(
            info.documentation_url,
            "https://quobix.com/vacuum/rules/info/info-description"
        );
        assert_eq!(
            rules[NO_REF_SIBLINGS].documentation_url,
            "https://quobix.com/vacuum/rules/schemas/no-ref-siblings"
        );
        assert!(!rules[NO_REF_SIBLINGS].resolved);
        assert!(rules.values().all(|r| r.category.is_some() && !r.how_to_fix.is_empty()));
    }
}
