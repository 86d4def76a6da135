//! 정책 컴파일러 — 검증된 정책을 평탄한 필터 규칙 목록으로 변환
//!
//! (정책 × egress 규칙 × 해석된 주소 × 포트 엔트리) 조합마다
//! [`CompiledRule`] 하나를 생성합니다. 컴파일된 규칙에 매칭되지 않는
//! 패킷의 기본 액션은 **차단**이며, 일부 규칙의 해석이 실패해도
//! 이 불변식은 유지됩니다.
//!
//! 라벨 해석은 외부 호출을 제한하기 위해 포트 단위가 아니라
//! egress 규칙 단위로 한 번만 수행합니다.

use std::collections::HashSet;

use metrics::counter;
use tracing::{debug, warn};

use zeroseg_core::backend::LabelResolver;
use zeroseg_core::error::ResolveError;
use zeroseg_core::metrics::{RULES_COMPILED_TOTAL, RULES_UNRESOLVED_TOTAL};
use zeroseg_core::types::{
    Action, CompiledPolicy, CompiledRule, Protocol, RuleScope, format_labels,
};

use crate::cidr::Ipv4Cidr;
use crate::model::{EgressRule, NetworkPolicy};

/// 정책 컴파일러
///
/// 라벨 해석기는 명시적으로 주입됩니다 (전역 싱글톤 없음).
pub struct PolicyCompiler<'a> {
    resolver: &'a dyn LabelResolver,
}

impl<'a> PolicyCompiler<'a> {
    /// 주어진 해석기로 컴파일러를 생성합니다.
    pub fn new(resolver: &'a dyn LabelResolver) -> Self {
        Self { resolver }
    }

    /// 정책 하나를 컴파일합니다.
    ///
    /// 해석 실패한 egress 규칙은 규칙을 생성하지 않고
    /// `unresolved`에 셀렉터를 기록한 뒤 계속 진행합니다.
    pub fn compile(&self, policy: &NetworkPolicy) -> CompiledPolicy {
        let mut seen = HashSet::new();
        self.compile_with_seen(policy, &mut seen)
    }

    /// 정책 목록 전체를 컴파일합니다.
    ///
    /// (address, port, protocol) 트리플은 로드 전체에서 유일하며,
    /// 중복은 첫 번째 규칙을 남기고 멱등하게 무시됩니다.
    pub fn compile_all(&self, policies: &[NetworkPolicy]) -> Vec<CompiledPolicy> {
        let mut seen = HashSet::new();
        policies
            .iter()
            .map(|p| self.compile_with_seen(p, &mut seen))
            .collect()
    }

    fn compile_with_seen(
        &self,
        policy: &NetworkPolicy,
        seen: &mut HashSet<(u32, u16, u8)>,
    ) -> CompiledPolicy {
        let name = policy.metadata.name.as_str();
        let mut rules = Vec::new();
        let mut unresolved = Vec::new();

        for egress in &policy.spec.egress {
            if egress.to.has_ip_block() {
                self.compile_cidr_rule(name, egress, seen, &mut rules);
            } else if egress.to.has_pod_selector() {
                self.compile_selector_rule(name, egress, seen, &mut rules, &mut unresolved);
            }
        }

        counter!(RULES_COMPILED_TOTAL).increment(rules.len() as u64);

        CompiledPolicy {
            name: name.to_owned(),
            rules,
            unresolved,
        }
    }

    fn compile_cidr_rule(
        &self,
        policy: &str,
        egress: &EgressRule,
        seen: &mut HashSet<(u32, u16, u8)>,
        rules: &mut Vec<CompiledRule>,
    ) {
        let cidr: Ipv4Cidr = match egress.to.ip_block.cidr.parse() {
            Ok(cidr) => cidr,
            Err(e) => {
                // validate()가 선행되므로 도달하지 않는 경로
                warn!(policy, cidr = %egress.to.ip_block.cidr, error = %e, "skipping unparsable CIDR");
                return;
            }
        };

        // 전체 범위 매칭 대신 대표 주소(네트워크 주소) 하나만 사용.
        // 프리픽스 길이는 RuleScope에 보존되어 pf 렌더러가 소비한다.
        let address = cidr.network();

        for port in &egress.ports {
            let Some(protocol) = Protocol::parse(&port.protocol) else {
                continue;
            };
            let rule = CompiledRule {
                address,
                port: port.port as u16,
                protocol,
                action: Action::Allow,
                scope: RuleScope::Cidr {
                    prefix_len: cidr.prefix_len(),
                },
            };
            push_unique(policy, rule, seen, rules);
        }
    }

    fn compile_selector_rule(
        &self,
        policy: &str,
        egress: &EgressRule,
        seen: &mut HashSet<(u32, u16, u8)>,
        rules: &mut Vec<CompiledRule>,
        unresolved: &mut Vec<String>,
    ) {
        let labels = &egress.to.pod_selector.match_labels;

        // egress 규칙당 한 번만 해석 (포트당 아님)
        let addresses = match self.resolver.resolve(labels) {
            Ok(addresses) => addresses,
            Err(ResolveError::NotFound { labels }) => {
                warn!(
                    policy,
                    selector = %labels,
                    "label selector resolved to no addresses, skipping egress rule"
                );
                counter!(RULES_UNRESOLVED_TOTAL).increment(1);
                unresolved.push(labels);
                return;
            }
            Err(e) => {
                warn!(
                    policy,
                    selector = %format_labels(labels),
                    error = %e,
                    "label resolution failed, skipping egress rule"
                );
                counter!(RULES_UNRESOLVED_TOTAL).increment(1);
                unresolved.push(format_labels(labels));
                return;
            }
        };

        for address in addresses {
            for port in &egress.ports {
                let Some(protocol) = Protocol::parse(&port.protocol) else {
                    continue;
                };
                let rule = CompiledRule {
                    address,
                    port: port.port as u16,
                    protocol,
                    action: Action::Allow,
                    scope: RuleScope::Resolved,
                };
                push_unique(policy, rule, seen, rules);
            }
        }
    }
}

/// 중복되지 않은 규칙만 추가합니다 (첫 번째 규칙 우선).
fn push_unique(
    policy: &str,
    rule: CompiledRule,
    seen: &mut HashSet<(u32, u16, u8)>,
    rules: &mut Vec<CompiledRule>,
) {
    if seen.insert(rule.key()) {
        debug!(
            policy,
            address = %rule.address,
            port = rule.port,
            protocol = %rule.protocol,
            action = %rule.action,
            "compiled rule"
        );
        rules.push(rule);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::net::Ipv4Addr;

    use zeroseg_core::error::ResolveError;

    use crate::model::{EgressRule, EgressTarget, IpBlock, PodSelector, PortRule, load_documents};
    use crate::resolver::StaticResolver;

    use super::*;

    /// 항상 NotFound를 반환하는 해석기
    struct EmptyResolver;

    impl LabelResolver for EmptyResolver {
        fn resolve(
            &self,
            labels: &BTreeMap<String, String>,
        ) -> Result<Vec<Ipv4Addr>, ResolveError> {
            Err(ResolveError::NotFound {
                labels: format_labels(labels),
            })
        }
    }

    fn cidr_policy(name: &str, cidr: &str, protocol: &str, port: i64) -> NetworkPolicy {
        let mut policy = NetworkPolicy {
            api_version: "zeroseg/v1".to_owned(),
            kind: "NetworkPolicy".to_owned(),
            ..Default::default()
        };
        policy.metadata.name = name.to_owned();
        policy
            .spec
            .pod_selector
            .match_labels
            .insert("app".to_owned(), "web".to_owned());
        policy.spec.egress.push(EgressRule {
            to: EgressTarget {
                ip_block: IpBlock {
                    cidr: cidr.to_owned(),
                },
                ..Default::default()
            },
            ports: vec![PortRule {
                protocol: protocol.to_owned(),
                port,
            }],
        });
        policy
    }

    fn selector_egress(labels: &[(&str, &str)], protocol: &str, port: i64) -> EgressRule {
        let mut match_labels = BTreeMap::new();
        for (k, v) in labels {
            match_labels.insert((*k).to_owned(), (*v).to_owned());
        }
        EgressRule {
            to: EgressTarget {
                pod_selector: PodSelector { match_labels },
                ..Default::default()
            },
            ports: vec![PortRule {
                protocol: protocol.to_owned(),
                port,
            }],
        }
    }

    #[test]
    fn cidr_rule_compiles_to_single_allow_rule() {
        let policy = cidr_policy("allow-dns", "10.0.0.0/8", "TCP", 443);
        let resolver = EmptyResolver;
        let compiled = PolicyCompiler::new(&resolver).compile(&policy);

        assert_eq!(compiled.name, "allow-dns");
        assert_eq!(compiled.rules.len(), 1);
        assert!(compiled.unresolved.is_empty());

        let rule = &compiled.rules[0];
        assert_eq!(rule.address, Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(rule.port, 443);
        assert_eq!(rule.protocol, Protocol::Tcp);
        assert_eq!(rule.action, Action::Allow);
        assert_eq!(rule.scope, RuleScope::Cidr { prefix_len: 8 });
    }

    #[test]
    fn cidr_rule_uses_network_address_as_representative() {
        let policy = cidr_policy("masked", "192.168.1.77/24", "UDP", 53);
        let resolver = EmptyResolver;
        let compiled = PolicyCompiler::new(&resolver).compile(&policy);
        assert_eq!(compiled.rules[0].address, Ipv4Addr::new(192, 168, 1, 0));
    }

    #[test]
    fn cidr_rule_emits_one_rule_per_port_entry() {
        let mut policy = cidr_policy("multi-port", "10.0.2.0/24", "TCP", 5432);
        policy.spec.egress[0].ports.push(PortRule {
            protocol: "TCP".to_owned(),
            port: 5433,
        });
        policy.spec.egress[0].ports.push(PortRule {
            protocol: "UDP".to_owned(),
            port: 5432,
        });
        let resolver = EmptyResolver;
        let compiled = PolicyCompiler::new(&resolver).compile(&policy);
        assert_eq!(compiled.rules.len(), 3);
    }

    #[test]
    fn selector_rule_emits_one_rule_per_resolved_address() {
        let mut resolver = StaticResolver::new();
        for i in 1..=3 {
            let mut labels = BTreeMap::new();
            labels.insert("app".to_owned(), "db".to_owned());
            resolver.register(format!("db-{i}"), Ipv4Addr::new(10, 0, 2, i), labels);
        }

        let mut policy = cidr_policy("web-to-db", "172.16.0.0/12", "TCP", 443);
        policy.spec.egress.clear();
        policy
            .spec
            .egress
            .push(selector_egress(&[("app", "db")], "TCP", 5432));

        let compiled = PolicyCompiler::new(&resolver).compile(&policy);
        assert_eq!(compiled.rules.len(), 3);
        for rule in &compiled.rules {
            assert_eq!(rule.port, 5432);
            assert_eq!(rule.protocol, Protocol::Tcp);
            assert_eq!(rule.action, Action::Allow);
            assert_eq!(rule.scope, RuleScope::Resolved);
        }
    }

    #[test]
    fn unresolved_selector_skips_rule_and_continues() {
        let mut policy = cidr_policy("partial", "10.0.2.0/24", "TCP", 5432);
        policy
            .spec
            .egress
            .insert(0, selector_egress(&[("app", "ghost")], "TCP", 80));

        let resolver = EmptyResolver;
        let compiled = PolicyCompiler::new(&resolver).compile(&policy);

        // 셀렉터 규칙은 0개, CIDR 규칙은 계속 컴파일됨
        assert_eq!(compiled.rules.len(), 1);
        assert_eq!(compiled.rules[0].port, 5432);
        assert_eq!(compiled.unresolved, vec!["app=ghost".to_owned()]);
    }

    #[test]
    fn duplicate_rules_within_policy_are_dropped() {
        let mut policy = cidr_policy("dup", "10.0.2.0/24", "TCP", 5432);
        let clone = policy.spec.egress[0].clone();
        policy.spec.egress.push(clone);

        let resolver = EmptyResolver;
        let compiled = PolicyCompiler::new(&resolver).compile(&policy);
        assert_eq!(compiled.rules.len(), 1);
    }

    #[test]
    fn compile_all_dedups_across_policies() {
        let a = cidr_policy("policy-a", "10.0.2.0/24", "TCP", 5432);
        let b = cidr_policy("policy-b", "10.0.2.0/24", "TCP", 5432);
        let resolver = EmptyResolver;
        let compiled = PolicyCompiler::new(&resolver).compile_all(&[a, b]);

        assert_eq!(compiled.len(), 2);
        assert_eq!(compiled[0].rules.len(), 1);
        // 첫 번째 정책의 규칙이 우선, 두 번째는 멱등하게 무시
        assert_eq!(compiled[1].rules.len(), 0);
    }

    #[test]
    fn end_to_end_web_to_db_scenario() {
        let data = r#"
apiVersion: zeroseg/v1
kind: NetworkPolicy
metadata:
  name: web-to-db
spec:
  podSelector:
    matchLabels:
      app: web
  egress:
    - to:
        ipBlock:
          cidr: 10.0.2.0/24
      ports:
        - protocol: TCP
          port: 5432
"#;
        let policies = load_documents(data).unwrap();
        assert_eq!(policies.len(), 1);
        policies[0].validate().unwrap();

        let resolver = EmptyResolver;
        let compiled = PolicyCompiler::new(&resolver).compile_all(&policies);
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].rules.len(), 1);
        assert_eq!(compiled[0].rules[0].action, Action::Allow);
    }
}
