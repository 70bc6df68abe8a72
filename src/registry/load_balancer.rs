//! 负载均衡模块
//!
//! 提供多种负载均衡策略，用于从多个服务实例中选择一个

use super::instance::ServiceInstance;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// 负载均衡策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalance {
    /// 随机（Random）
    #[default]
    Random,
    /// 轮询（Round Robin）
    RoundRobin,
    /// 加权随机，权重取自实例元数据 `weight`
    WeightedRandom,
}

/// 负载均衡器
#[derive(Debug)]
pub struct LoadBalancer {
    strategy: LoadBalance,
    round_robin_index: AtomicUsize,
}

impl LoadBalancer {
    /// 创建新的负载均衡器
    pub fn new(strategy: LoadBalance) -> Self {
        Self {
            strategy,
            round_robin_index: AtomicUsize::new(0),
        }
    }

    pub fn strategy(&self) -> LoadBalance {
        self.strategy
    }

    /// 选择服务实例
    pub fn select<'a>(&self, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        if instances.is_empty() {
            return None;
        }

        match self.strategy {
            LoadBalance::Random => self.select_random(instances),
            LoadBalance::RoundRobin => self.select_round_robin(instances),
            LoadBalance::WeightedRandom => self.select_weighted(instances),
        }
    }

    /// 轮询选择
    fn select_round_robin<'a>(&self, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        let index = self.round_robin_index.fetch_add(1, Ordering::Relaxed);
        instances.get(index % instances.len())
    }

    /// 随机选择
    fn select_random<'a>(&self, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        let index = rand::thread_rng().gen_range(0..instances.len());
        instances.get(index)
    }

    /// 加权随机选择，总权重为 0 时退化为随机
    fn select_weighted<'a>(&self, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        let total: u64 = instances.iter().map(|i| u64::from(i.weight())).sum();
        if total == 0 {
            return self.select_random(instances);
        }

        let mut point = rand::thread_rng().gen_range(0..total);
        for instance in instances {
            let weight = u64::from(instance.weight());
            if point < weight {
                return Some(instance);
            }
            point -= weight;
        }
        instances.last()
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new(LoadBalance::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::instance::METADATA_WEIGHT;
    use std::collections::HashSet;

    fn instances(n: u16) -> Vec<ServiceInstance> {
        (0..n)
            .map(|i| ServiceInstance::new("echo", "127.0.0.1", 9000 + i))
            .collect()
    }

    #[test]
    fn empty_list_yields_none() {
        for strategy in [LoadBalance::Random, LoadBalance::RoundRobin, LoadBalance::WeightedRandom] {
            assert!(LoadBalancer::new(strategy).select(&[]).is_none());
        }
    }

    #[test]
    fn round_robin_cycles_in_order() {
        let list = instances(3);
        let lb = LoadBalancer::new(LoadBalance::RoundRobin);
        let ports: Vec<u16> = (0..6).map(|_| lb.select(&list).unwrap().port()).collect();
        assert_eq!(ports, vec![9000, 9001, 9002, 9000, 9001, 9002]);
    }

    #[test]
    fn random_reaches_every_instance() {
        let list = instances(3);
        let lb = LoadBalancer::new(LoadBalance::Random);
        let seen: HashSet<u16> = (0..300).map(|_| lb.select(&list).unwrap().port()).collect();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn weighted_skips_zero_weight() {
        let list = vec![
            ServiceInstance::new("echo", "a", 1).with_metadata(METADATA_WEIGHT, "0"),
            ServiceInstance::new("echo", "b", 2).with_metadata(METADATA_WEIGHT, "5"),
            ServiceInstance::new("echo", "c", 3).with_metadata(METADATA_WEIGHT, "0"),
        ];
        let lb = LoadBalancer::new(LoadBalance::WeightedRandom);
        for _ in 0..200 {
            assert_eq!(lb.select(&list).unwrap().host(), "b");
        }
    }
}
