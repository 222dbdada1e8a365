//! Terraform interpolation markers

/// Variable holding the target cloud, upper-cased for comparisons
pub const CLOUD_VARIABLE: &str = "upper(var.CLOUD)";

/// Variable switching the export into passive (disaster recovery) mode
pub const PASSIVE_MODE_VARIABLE: &str = "tobool(var.PASSIVE_MODE)";

/// Wrap a raw expression as `${...}`
pub fn wrap(expr: &str) -> String {
    format!("${{{expr}}}")
}

/// `${var.NAME}`
pub fn variable(name: &str) -> String {
    wrap(&variable_ref(name))
}

/// `var.NAME` without the interpolation marker
pub fn variable_ref(name: &str) -> String {
    format!("var.{name}")
}

/// `${TYPE.ID.ATTR}`
pub fn resource(resource_type: &str, resource_id: &str, attribute: &str) -> String {
    wrap(&format!("{resource_type}.{resource_id}.{attribute}"))
}

/// `${COND ? A : B}`
pub fn ternary(condition: &str, when_true: &str, when_false: &str) -> String {
    wrap(&format!("{condition} ? {when_true} : {when_false}"))
}
