//! ballast-aws: the AWS control plane provider.
//!
//! Implements [`ControlPlane`] over Elastic Load Balancing v2 and EC2:
//!
//! - target group discovery via `DescribeTargetGroups`
//! - member health via `DescribeTargetHealth`
//! - member capacity via `DescribeInstances` (`CpuOptions`: core count
//!   times threads per core)
//! - forwarding reads and writes via `DescribeListeners` /
//!   `ModifyListener`
//!
//! `ModifyListener` replaces the whole default action list, so the plane
//! keeps the raw listener from the last describe and rebuilds the full
//! list on write: non-forward actions, action order, and forward-config
//! stickiness all survive; only the target group weights change. There is
//! no conditional-update primitive in ELBv2, so a concurrent external edit
//! between describe and modify is overwritten.

mod error;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_elasticloadbalancingv2::Client as ElbClient;
use aws_sdk_elasticloadbalancingv2::types::{
    Action, ActionTypeEnum, ForwardActionConfig, Listener, TargetGroupTuple,
};
use tracing::debug;

use ballast_core::{
    BallastConfig, BallastError, BallastResult, ControlPlane, HealthState, ListenerForwarding,
    ListenerId, MAX_WEIGHT, MemberCapacity, MemberHealth, TargetGroupId, WeightedTargetGroup,
};

use crate::error::classify;

/// AWS-backed [`ControlPlane`].
pub struct AwsPlane {
    elb: ElbClient,
    ec2: Ec2Client,
    /// Raw listeners from the last describe, keyed by ARN. Reused on write
    /// to rebuild the full default action list.
    listeners: Mutex<HashMap<ListenerId, Listener>>,
}

impl AwsPlane {
    /// Build clients from the default credential/region chain, with the
    /// configured region override, per-operation timeout, and bounded
    /// retries. Retried writes are safe: `ModifyListener` sets absolute
    /// weights.
    pub async fn connect(config: &BallastConfig) -> Self {
        let region_provider = match config.plane.region.clone() {
            Some(region) => {
                RegionProviderChain::first_try(Region::new(region)).or_default_provider()
            }
            None => RegionProviderChain::default_provider(),
        };
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.operation_timeout())
                    .build(),
            )
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_retries() + 1))
            .load()
            .await;

        Self {
            elb: ElbClient::new(&sdk_config),
            ec2: Ec2Client::new(&sdk_config),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    async fn describe_one(&self, listener: &str) -> BallastResult<Listener> {
        let output = self
            .elb
            .describe_listeners()
            .listener_arns(listener)
            .send()
            .await
            .map_err(|e| classify(&format!("describe listener {listener}"), &e))?;
        output
            .listeners()
            .first()
            .cloned()
            .ok_or_else(|| BallastError::NotFound(format!("listener {listener}")))
    }
}

#[async_trait]
impl ControlPlane for AwsPlane {
    async fn target_groups(&self, lb: &str) -> BallastResult<Vec<TargetGroupId>> {
        let output = self
            .elb
            .describe_target_groups()
            .load_balancer_arn(lb)
            .send()
            .await
            .map_err(|e| classify(&format!("describe target groups for {lb}"), &e))?;

        let mut tgs: Vec<TargetGroupId> = output
            .target_groups()
            .iter()
            .filter_map(|tg| tg.target_group_arn().map(str::to_string))
            .collect();
        tgs.sort();
        tgs.dedup();
        Ok(tgs)
    }

    async fn member_health(&self, tg: &str) -> BallastResult<Vec<MemberHealth>> {
        let output = self
            .elb
            .describe_target_health()
            .target_group_arn(tg)
            .send()
            .await
            .map_err(|e| classify(&format!("describe target health for {tg}"), &e))?;

        let members = output
            .target_health_descriptions()
            .iter()
            .filter_map(|desc| {
                let member = desc.target().map(|t| t.id().to_string())?;
                let state = desc
                    .target_health()
                    .and_then(|h| h.state())
                    .map(|s| HealthState::parse(s.as_str()))
                    .unwrap_or(HealthState::Unavailable);
                Some(MemberHealth { member, state })
            })
            .collect();
        Ok(members)
    }

    async fn member_capacity(&self, member: &str) -> BallastResult<MemberCapacity> {
        let output = self
            .ec2
            .describe_instances()
            .instance_ids(member)
            .send()
            .await
            .map_err(|e| classify(&format!("describe instance {member}"), &e))?;

        let instance = output
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .next()
            .ok_or_else(|| BallastError::NotFound(format!("member {member}")))?;

        let cpu = instance
            .cpu_options()
            .ok_or_else(|| BallastError::Api(format!("no cpu options reported for {member}")))?;

        Ok(MemberCapacity {
            core_count: cpu.core_count().unwrap_or(0).max(0) as u32,
            threads_per_core: cpu.threads_per_core().unwrap_or(0).max(0) as u32,
        })
    }

    async fn forwarding(&self, listeners: &[ListenerId]) -> BallastResult<Vec<ListenerForwarding>> {
        if listeners.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.elb.describe_listeners();
        for listener in listeners {
            request = request.listener_arns(listener);
        }
        let output = request
            .send()
            .await
            .map_err(|e| classify("describe listeners", &e))?;

        {
            let mut cache = self.listeners.lock().expect("listener cache lock");
            for listener in output.listeners() {
                if let Some(arn) = listener.listener_arn() {
                    cache.insert(arn.to_string(), listener.clone());
                }
            }
        }

        // The response order is not guaranteed; re-key by request order.
        let by_arn: HashMap<&str, &Listener> = output
            .listeners()
            .iter()
            .filter_map(|l| l.listener_arn().map(|arn| (arn, l)))
            .collect();

        let mut out = Vec::with_capacity(listeners.len());
        for requested in listeners {
            let listener = by_arn
                .get(requested.as_str())
                .ok_or_else(|| BallastError::NotFound(format!("listener {requested}")))?;
            out.push(ListenerForwarding {
                listener: requested.clone(),
                entries: forward_entries(listener),
            });
        }
        Ok(out)
    }

    async fn update_forwarding(
        &self,
        listener: &str,
        entries: &[WeightedTargetGroup],
    ) -> BallastResult<()> {
        let cached = {
            let cache = self.listeners.lock().expect("listener cache lock");
            cache.get(listener).cloned()
        };
        let raw = match cached {
            Some(l) => l,
            None => {
                debug!(listener = %listener, "listener not cached, describing before write");
                self.describe_one(listener).await?
            }
        };

        let actions = rebuild_actions(&raw, entries)?;
        let mut request = self.elb.modify_listener().listener_arn(listener);
        for action in actions {
            request = request.default_actions(action);
        }
        request
            .send()
            .await
            .map_err(|e| classify(&format!("modify listener {listener}"), &e))?;
        Ok(())
    }
}

/// Flatten a listener's forward action into weighted entries.
fn forward_entries(listener: &Listener) -> Vec<WeightedTargetGroup> {
    let mut entries = Vec::new();
    for action in listener.default_actions() {
        if let Some(config) = action.forward_config() {
            for tuple in config.target_groups() {
                if let Some(arn) = tuple.target_group_arn() {
                    entries.push(WeightedTargetGroup {
                        target_group: arn.to_string(),
                        weight: tuple.weight().unwrap_or(0).max(0) as u32,
                    });
                }
            }
        } else if *action.r#type() == ActionTypeEnum::Forward {
            // Single-group form without an explicit config. The implied
            // weight is 1, matching how the control plane migrates it to
            // the weighted form.
            if let Some(arn) = action.target_group_arn() {
                entries.push(WeightedTargetGroup {
                    target_group: arn.to_string(),
                    weight: 1,
                });
            }
        }
    }
    entries
}

/// Rebuild the full default action list with new forward weights.
///
/// Non-forward actions pass through untouched. The forward action keeps
/// its order and stickiness config and gets the new target group tuples.
fn rebuild_actions(raw: &Listener, entries: &[WeightedTargetGroup]) -> BallastResult<Vec<Action>> {
    let mut rebuilt = Vec::with_capacity(raw.default_actions().len());
    for action in raw.default_actions() {
        let is_forward =
            *action.r#type() == ActionTypeEnum::Forward || action.forward_config().is_some();
        if !is_forward {
            rebuilt.push(action.clone());
            continue;
        }

        let mut forward = ForwardActionConfig::builder();
        for entry in entries {
            forward = forward.target_groups(
                TargetGroupTuple::builder()
                    .target_group_arn(&entry.target_group)
                    .weight(entry.weight.min(MAX_WEIGHT) as i32)
                    .build(),
            );
        }
        if let Some(stickiness) = action
            .forward_config()
            .and_then(|c| c.target_group_stickiness_config())
        {
            forward = forward.target_group_stickiness_config(stickiness.clone());
        }

        let mut builder = Action::builder()
            .r#type(ActionTypeEnum::Forward)
            .forward_config(forward.build());
        if let Some(order) = action.order() {
            builder = builder.order(order);
        }
        let rebuilt_action = builder
            .build()
            .map_err(|e| BallastError::Api(format!("failed to build forward action: {e}")))?;
        rebuilt.push(rebuilt_action);
    }
    Ok(rebuilt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_elasticloadbalancingv2::types::TargetGroupStickinessConfig;

    fn tuple(arn: &str, weight: i32) -> TargetGroupTuple {
        TargetGroupTuple::builder()
            .target_group_arn(arn)
            .weight(weight)
            .build()
    }

    fn forward_action(tuples: Vec<TargetGroupTuple>) -> Action {
        let mut config = ForwardActionConfig::builder();
        for t in tuples {
            config = config.target_groups(t);
        }
        Action::builder()
            .r#type(ActionTypeEnum::Forward)
            .forward_config(config.build())
            .build()
            .unwrap()
    }

    fn entry(tg: &str, weight: u32) -> WeightedTargetGroup {
        WeightedTargetGroup {
            target_group: tg.to_string(),
            weight,
        }
    }

    #[test]
    fn forward_entries_reads_weighted_tuples() {
        let listener = Listener::builder()
            .listener_arn("lsn-1")
            .default_actions(forward_action(vec![tuple("tg-a", 100), tuple("tg-b", 899)]))
            .build();

        assert_eq!(
            forward_entries(&listener),
            vec![entry("tg-a", 100), entry("tg-b", 899)]
        );
    }

    #[test]
    fn forward_entries_defaults_missing_weight_to_zero() {
        let bare = TargetGroupTuple::builder().target_group_arn("tg-a").build();
        let listener = Listener::builder()
            .listener_arn("lsn-1")
            .default_actions(forward_action(vec![bare]))
            .build();

        assert_eq!(forward_entries(&listener), vec![entry("tg-a", 0)]);
    }

    #[test]
    fn forward_entries_handles_single_group_form() {
        let action = Action::builder()
            .r#type(ActionTypeEnum::Forward)
            .target_group_arn("tg-solo")
            .build()
            .unwrap();
        let listener = Listener::builder()
            .listener_arn("lsn-1")
            .default_actions(action)
            .build();

        assert_eq!(forward_entries(&listener), vec![entry("tg-solo", 1)]);
    }

    #[test]
    fn rebuild_replaces_tuples_and_keeps_other_actions() {
        let auth = Action::builder()
            .r#type(ActionTypeEnum::AuthenticateOidc)
            .order(1)
            .build()
            .unwrap();
        let forward = Action::builder()
            .r#type(ActionTypeEnum::Forward)
            .order(2)
            .forward_config(
                ForwardActionConfig::builder()
                    .target_groups(tuple("tg-a", 1))
                    .build(),
            )
            .build()
            .unwrap();
        let listener = Listener::builder()
            .listener_arn("lsn-1")
            .default_actions(auth)
            .default_actions(forward)
            .build();

        let actions = rebuild_actions(&listener, &[entry("tg-a", 249), entry("tg-b", 749)]).unwrap();

        assert_eq!(actions.len(), 2);
        assert_eq!(*actions[0].r#type(), ActionTypeEnum::AuthenticateOidc);
        assert_eq!(actions[1].order(), Some(2));
        let tuples = actions[1].forward_config().unwrap().target_groups();
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[0].target_group_arn(), Some("tg-a"));
        assert_eq!(tuples[0].weight(), Some(249));
        assert_eq!(tuples[1].weight(), Some(749));
    }

    #[test]
    fn rebuild_preserves_stickiness() {
        let forward = Action::builder()
            .r#type(ActionTypeEnum::Forward)
            .forward_config(
                ForwardActionConfig::builder()
                    .target_groups(tuple("tg-a", 1))
                    .target_group_stickiness_config(
                        TargetGroupStickinessConfig::builder()
                            .enabled(true)
                            .duration_seconds(300)
                            .build(),
                    )
                    .build(),
            )
            .build()
            .unwrap();
        let listener = Listener::builder()
            .listener_arn("lsn-1")
            .default_actions(forward)
            .build();

        let actions = rebuild_actions(&listener, &[entry("tg-a", 999)]).unwrap();
        let stickiness = actions[0]
            .forward_config()
            .unwrap()
            .target_group_stickiness_config()
            .unwrap();
        assert_eq!(stickiness.enabled(), Some(true));
        assert_eq!(stickiness.duration_seconds(), Some(300));
    }

    #[test]
    fn rebuild_clamps_out_of_range_weights() {
        let listener = Listener::builder()
            .listener_arn("lsn-1")
            .default_actions(forward_action(vec![tuple("tg-a", 1)]))
            .build();

        let actions = rebuild_actions(&listener, &[entry("tg-a", 5000)]).unwrap();
        let tuples = actions[0].forward_config().unwrap().target_groups();
        assert_eq!(tuples[0].weight(), Some(999));
    }

    #[test]
    fn rebuild_converts_single_group_form_to_weighted() {
        let action = Action::builder()
            .r#type(ActionTypeEnum::Forward)
            .target_group_arn("tg-solo")
            .build()
            .unwrap();
        let listener = Listener::builder()
            .listener_arn("lsn-1")
            .default_actions(action)
            .build();

        let actions = rebuild_actions(&listener, &[entry("tg-solo", 999)]).unwrap();
        assert!(actions[0].forward_config().is_some());
        let tuples = actions[0].forward_config().unwrap().target_groups();
        assert_eq!(tuples[0].target_group_arn(), Some("tg-solo"));
        assert_eq!(tuples[0].weight(), Some(999));
    }
}
