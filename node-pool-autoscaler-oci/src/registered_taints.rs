use anyhow::Error;
use k8s_openapi::api::core::v1::Taint;
use node_pool_autoscaler::taints::parse_taints;
use regex::Regex;

use crate::oke::NodePool;

const KUBELET_EXTRA_ARGS: &str = "kubelet-extra-args";

/// Taints a pool's nodes register with, taken from the `--register-with-taints`
/// flag in the pool's kubelet extra args.
pub fn registered_taints(pool: &NodePool) -> Result<Vec<Taint>, Error> {
    match pool.node_metadata.get(KUBELET_EXTRA_ARGS) {
        Some(args) => taints_from_kubelet_args(args),
        None => Ok(vec![]),
    }
}

/// Accepts both `--register-with-taints=<list>` and `--register-with-taints <list>`.
pub fn taints_from_kubelet_args(args: &str) -> Result<Vec<Taint>, Error> {
    let re = Regex::new(r#"--register-with-taints(?:=|\s+)["']?([^\s"']+)"#)?;
    let mut taints = vec![];
    for captures in re.captures_iter(args) {
        taints.extend(parse_taints(&captures[1])?);
    }
    Ok(taints)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn parses_equals_syntax() {
        let taints = taints_from_kubelet_args(
            "--register-with-taints=testTaint1=hello:NoSchedule,testTaint2=world:NoSchedule",
        )
        .unwrap();

        assert_eq!(taints.len(), 2);
        assert_eq!(taints[0].key, "testTaint1");
        assert_eq!(taints[0].value.as_deref(), Some("hello"));
        assert_eq!(taints[1].key, "testTaint2");
        assert_eq!(taints[1].effect, "NoSchedule");
    }

    #[test]
    fn parses_space_syntax_among_other_flags() {
        let taints = taints_from_kubelet_args(
            "--max-pods=31 --register-with-taints \"dedicated=gpu:NoExecute\" --v=2",
        )
        .unwrap();

        assert_eq!(taints.len(), 1);
        assert_eq!(taints[0].effect, "NoExecute");
    }

    #[test]
    fn malformed_taint_fails_the_whole_list() {
        let result =
            taints_from_kubelet_args("--register-with-taints=testTaint1=hello,world:NoSchedule");
        assert!(result.is_err());
    }

    #[test]
    fn pool_without_extra_args_has_no_taints() {
        assert!(registered_taints(&NodePool::default()).unwrap().is_empty());

        let pool = NodePool {
            node_metadata: HashMap::from([(
                KUBELET_EXTRA_ARGS.to_string(),
                "--register-with-taints=a=b:NoSchedule".to_string(),
            )]),
            ..Default::default()
        };
        assert_eq!(registered_taints(&pool).unwrap().len(), 1);
    }
}
