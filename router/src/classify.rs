//! Light/heavy classification: the declarative rules applied in order,
//! mirroring the teacher's `TaskProfile` -> tier-selection shape.

use forge_core::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Light,
    Heavy,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Light => "light",
            Tier::Heavy => "heavy",
        }
    }
}

const HEAVY_DOMAINS: &[&str] = &[
    "ai",
    "machine_learning",
    "deep_learning",
    "neural_networks",
    "complex_algorithms",
];

/// Classifies `task` by the rules applied in order: an explicit
/// `requiresSandbox` flag, a complexity threshold, then a fixed list of
/// domains known to need the heavy pipeline. Everything else is light.
pub fn classify(task: &Task) -> Tier {
    if task.spec.flags.requires_sandbox {
        return Tier::Heavy;
    }
    if task.spec.flags.max_complexity > 5 {
        return Tier::Heavy;
    }
    if HEAVY_DOMAINS.contains(&task.domain.as_str()) {
        return Tier::Heavy;
    }
    Tier::Light
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::{Spec, SpecFlags};

    fn task_with(domain: &str, flags: SpecFlags) -> Task {
        let mut task = Task::new(domain, serde_json::Value::Null);
        task.spec = Spec {
            flags,
            ..Default::default()
        };
        task
    }

    #[test]
    fn requires_sandbox_forces_heavy() {
        let task = task_with(
            "text",
            SpecFlags {
                requires_sandbox: true,
                max_complexity: 0,
            },
        );
        assert_eq!(classify(&task), Tier::Heavy);
    }

    #[test]
    fn high_complexity_forces_heavy() {
        let task = task_with(
            "text",
            SpecFlags {
                requires_sandbox: false,
                max_complexity: 6,
            },
        );
        assert_eq!(classify(&task), Tier::Heavy);
    }

    #[test]
    fn complexity_at_threshold_stays_light() {
        let task = task_with(
            "text",
            SpecFlags {
                requires_sandbox: false,
                max_complexity: 5,
            },
        );
        assert_eq!(classify(&task), Tier::Light);
    }

    #[test]
    fn known_heavy_domain_forces_heavy_even_with_no_flags() {
        let task = task_with("machine_learning", SpecFlags::default());
        assert_eq!(classify(&task), Tier::Heavy);
    }

    #[test]
    fn plain_text_domain_is_light() {
        let task = task_with("text", SpecFlags::default());
        assert_eq!(classify(&task), Tier::Light);
    }
}
