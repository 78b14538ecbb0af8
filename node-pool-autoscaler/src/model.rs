use std::str::FromStr;

use crate::cloud_provider::ProviderError;

#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: String,
    pub status: Option<InstanceStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceStatus {
    pub state: Option<InstanceState>,
    pub error_info: Option<InstanceErrorInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Running,
    Creating,
    Deleting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    OutOfResources,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceErrorInfo {
    pub error_class: ErrorClass,
    pub error_code: String,
    pub error_message: String,
}

impl Instance {
    pub fn new(id: impl Into<String>, state: InstanceState) -> Self {
        Instance {
            id: id.into(),
            status: Some(InstanceStatus {
                state: Some(state),
                error_info: None,
            }),
        }
    }

    pub fn state(&self) -> Option<InstanceState> {
        self.status.as_ref().and_then(|s| s.state)
    }
}

/// Static node group definition, given on the command line as
/// `<minSize>:<maxSize>:<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGroupSpec {
    pub min_size: u32,
    pub max_size: u32,
    pub id: String,
}

impl FromStr for NodeGroupSpec {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ProviderError::InvalidNodeGroupSpec {
            spec: value.to_string(),
            reason,
        };

        let tokens: Vec<&str> = value.splitn(3, ':').collect();
        let &[min, max, id] = tokens.as_slice() else {
            return Err(invalid("expected <minSize>:<maxSize>:<id>".to_string()));
        };

        let min_size = min
            .parse()
            .map_err(|_| invalid(format!("failed to set min size: {min}, expected integer")))?;
        let max_size = max
            .parse()
            .map_err(|_| invalid(format!("failed to set max size: {max}, expected integer")))?;

        if id.is_empty() {
            return Err(invalid("missing node group id".to_string()));
        }

        let spec = NodeGroupSpec {
            min_size,
            max_size,
            id: id.to_string(),
        };
        tracing::info!("static node spec constructed: {:?}", spec);
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_min_max_and_id() {
        let spec: NodeGroupSpec = "1:5:ocid".parse().unwrap();
        assert_eq!(
            spec,
            NodeGroupSpec {
                min_size: 1,
                max_size: 5,
                id: "ocid".to_string()
            }
        );
    }

    #[test]
    fn keeps_colons_inside_id() {
        let spec: NodeGroupSpec = "0:3:pool:with:colons".parse().unwrap();
        assert_eq!(spec.id, "pool:with:colons");
    }

    #[test]
    fn rejects_wrong_token_count() {
        assert!("bad".parse::<NodeGroupSpec>().is_err());
        assert!("1:5".parse::<NodeGroupSpec>().is_err());
    }

    #[test]
    fn rejects_non_integer_bounds() {
        assert!("x:5:ocid".parse::<NodeGroupSpec>().is_err());
        assert!("1:y:ocid".parse::<NodeGroupSpec>().is_err());
        assert!("-1:5:ocid".parse::<NodeGroupSpec>().is_err());
    }
}
