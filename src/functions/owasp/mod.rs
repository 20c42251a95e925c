//! OWASP API security checks
//!
//! Like the OpenAPI functions these read the whole document and only use
//! the matched nodes to decide whether to run at all.

mod auth;
mod parameters;
mod responses;
mod schemas;

pub use auth::{AuthInsecureSchemes, CheckSecurity, HostsHttps, JwtBestPractice, NoApiKeysInUrl, NoBasicAuth};
pub use parameters::{NoCredentialsInUrl, NoNumericIds};
pub use responses::{CheckErrorResponse, DefineErrorDefinition, HeaderDefinition, RatelimitRetryAfter};
pub use schemas::{
    AdditionalPropertiesConstrained, ArrayLimit, IntegerFormat, IntegerLimit, NoAdditionalProperties,
    StringLimit, StringRestricted,
};

use super::openapi::operations;
use super::FunctionRegistry;
use crate::jsonpath::{append_index, append_key};
use crate::node::NodeRef;
use std::sync::Arc;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.register("owaspNoApiKeysInUrl", Arc::new(NoApiKeysInUrl));
    registry.register("owaspNoCredentialsInUrl", Arc::new(NoCredentialsInUrl));
    registry.register("owaspNoBasicAuth", Arc::new(NoBasicAuth));
    registry.register("owaspAuthInsecureSchemes", Arc::new(AuthInsecureSchemes));
    registry.register("owaspJWTBestPractice", Arc::new(JwtBestPractice));
    registry.register("owaspNoNumericIDs", Arc::new(NoNumericIds));
    registry.register("owaspSecurityHostsHttpsOas3", Arc::new(HostsHttps));
    registry.register("owaspArrayLimit", Arc::new(ArrayLimit));
    registry.register("owaspStringLimit", Arc::new(StringLimit));
    registry.register("owaspStringRestricted", Arc::new(StringRestricted));
    registry.register("owaspIntegerLimit", Arc::new(IntegerLimit));
    registry.register("owaspIntegerFormat", Arc::new(IntegerFormat));
    registry.register("owaspNoAdditionalProperties", Arc::new(NoAdditionalProperties));
    registry.register("owaspAdditionalPropertiesConstrained", Arc::new(AdditionalPropertiesConstrained));
    registry.register("owaspCheckErrorResponse", Arc::new(CheckErrorResponse));
    registry.register("owaspDefineErrorDefinition", Arc::new(DefineErrorDefinition));
    registry.register("owaspHeaderDefinition", Arc::new(HeaderDefinition));
    registry.register("owaspRatelimitRetryAfter", Arc::new(RatelimitRetryAfter));
    registry.register("owaspCheckSecurity", Arc::new(CheckSecurity));
}

/// A declared security scheme
pub(crate) struct SchemeSite {
    pub name: String,
    pub node: NodeRef,
    pub path: String,
}

/// Security schemes from `components.securitySchemes` or, for Swagger,
/// `securityDefinitions`
pub(crate) fn security_schemes(root: &NodeRef) -> Vec<SchemeSite> {
    let declared = root
        .get("components")
        .and_then(|c| c.get("securitySchemes"))
        .map(|s| (s, "$.components.securitySchemes"))
        .or_else(|| root.get("securityDefinitions").map(|s| (s, "$.securityDefinitions")));
    let Some((schemes, base)) = declared else {
        return Vec::new();
    };
    schemes
        .pairs()
        .filter(|(_, scheme)| scheme.is_map())
        .map(|(name, scheme)| SchemeSite {
            name: name.value.clone(),
            node: Arc::clone(scheme),
            path: append_key(base, &name.value),
        })
        .collect()
}

/// Path item and operation parameters with their paths
pub(crate) fn parameters(root: &NodeRef) -> Vec<(NodeRef, String)> {
    let mut found = Vec::new();
    if let Some(paths) = root.get("paths") {
        for (path, item) in paths.pairs() {
            if let Some(params) = item.get("parameters") {
                let base = append_key(&append_key("$.paths", &path.value), "parameters");
                for (i, param) in params.children().iter().enumerate() {
                    found.push((Arc::clone(param), append_index(&base, i)));
                }
            }
        }
    }
    for op in operations(root) {
        if let Some(params) = op.node.get("parameters") {
            let base = append_key(&op.json_path, "parameters");
            for (i, param) in params.children().iter().enumerate() {
                found.push((Arc::clone(param), append_index(&base, i)));
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::testing::root;

    #[test]
    fn test_security_schemes() {
        let doc = root("swagger: '2.0'\nsecurityDefinitions:\n  basic:\n    type: basic\n");
        let schemes = security_schemes(&doc);
        assert_eq!(schemes.len(), 1);
        assert_eq!(schemes[0].path, "$.securityDefinitions.basic");
    }

    #[test]
    fn test_parameters() {
        let doc = root(
            "paths:\n  /a:\n    parameters:\n      - name: x\n    get:\n      parameters:\n        - name: y\n        - name: z\n",
        );
        let found: Vec<String> = parameters(&doc).into_iter().map(|(_, p)| p).collect();
        assert_eq!(
            found,
            vec![
                "$.paths['/a'].parameters[0]",
                "$.paths['/a'].get.parameters[0]",
                "$.paths['/a'].get.parameters[1]"
            ]
        );
    }
}
