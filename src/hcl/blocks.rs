//! Known dynamic block kinds
//!
//! Each kind knows the Terraform block name it renders as and whether it is
//! only valid on one cloud. Cloud-specific blocks are guarded with
//! `upper(var.CLOUD) == "<CLOUD>"` so one export can be applied anywhere.

use super::interpolate::CLOUD_VARIABLE;

/// Target cloud of a workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cloud {
    Aws,
    Azure,
    Gcp,
}

impl Cloud {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cloud::Aws => "AWS",
            Cloud::Azure => "AZURE",
            Cloud::Gcp => "GCP",
        }
    }

    /// Boolean expression true when the export is applied on this cloud
    pub fn condition(&self) -> String {
        format!("{} == \"{}\"", CLOUD_VARIABLE, self.as_str())
    }
}

/// Guard attached to a dynamic block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockCondition {
    Cloud(Cloud),
    Expr(String),
}

impl BlockCondition {
    /// Terraform boolean expression of the guard
    pub fn expression(&self) -> String {
        match self {
            BlockCondition::Cloud(cloud) => cloud.condition(),
            BlockCondition::Expr(expr) => expr.clone(),
        }
    }
}

/// Dynamic blocks emitted by the built-in sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    AwsAttributes,
    AzureAttributes,
    GcpAttributes,
    DiskSpec,
    Autoscale,
    Library,
    InitScripts,
    ClusterLogConf,
}

impl BlockKind {
    /// Name of the Terraform block
    pub fn field_name(&self) -> &'static str {
        match self {
            BlockKind::AwsAttributes => "aws_attributes",
            BlockKind::AzureAttributes => "azure_attributes",
            BlockKind::GcpAttributes => "gcp_attributes",
            BlockKind::DiskSpec => "disk_spec",
            BlockKind::Autoscale => "autoscale",
            BlockKind::Library => "library",
            BlockKind::InitScripts => "init_scripts",
            BlockKind::ClusterLogConf => "cluster_log_conf",
        }
    }

    /// Cloud the block is restricted to, if any
    pub fn cloud(&self) -> Option<Cloud> {
        match self {
            BlockKind::AwsAttributes => Some(Cloud::Aws),
            BlockKind::AzureAttributes => Some(Cloud::Azure),
            BlockKind::GcpAttributes => Some(Cloud::Gcp),
            BlockKind::DiskSpec
            | BlockKind::Autoscale
            | BlockKind::Library
            | BlockKind::InitScripts
            | BlockKind::ClusterLogConf => None,
        }
    }

    pub fn condition(&self) -> Option<BlockCondition> {
        self.cloud().map(BlockCondition::Cloud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_blocks_are_guarded() {
        assert_eq!(
            BlockKind::AwsAttributes.condition(),
            Some(BlockCondition::Cloud(Cloud::Aws))
        );
        assert_eq!(BlockKind::DiskSpec.condition(), None);
        assert_eq!(
            Cloud::Azure.condition(),
            "upper(var.CLOUD) == \"AZURE\""
        );
    }
}
