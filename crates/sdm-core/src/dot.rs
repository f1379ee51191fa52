//! Graphviz export of a resolved goal set.

use crate::goal::{Goal, Goals};

const HEADER: &str = r#"fontname="Arial";
    splines="polyline";
    rankdir="LR";
    edge [arrowhead="vee"];
    node [shape=box, fontname="Arial", style="rounded"];"#;

/// Replace characters Graphviz ids cannot carry (`-`, whitespace, `.`).
pub fn sanitize_id(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == '-' || c == '.' || c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Node id for `goal`: its environment and unique name.
pub fn node_id(goal: &Goal) -> String {
    sanitize_id(&format!("{}_{}", goal.environment, goal.unique_name))
}

/// Quote-safe label text.
fn escape_label(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render `goals` as a DOT digraph.
///
/// One node per goal in set order, then one `precondition -> goal` edge
/// per declared precondition, in declaration order.
pub fn goals_to_dot(goals: &Goals) -> String {
    let mut lines: Vec<String> = goals
        .goals
        .iter()
        .map(|goal| format!("{} [label=\"{}\"]", node_id(goal), escape_label(&goal.label())))
        .collect();
    for goal in &goals.goals {
        let target = node_id(goal);
        for dependency in &goal.depends_on {
            lines.push(format!("{} -> {}", node_id(dependency), target));
        }
    }

    let mut dot = format!("digraph {} {{\n    {}\n", sanitize_id(&goals.name), HEADER);
    if !lines.is_empty() {
        dot.push_str(&format!("\n    {}\n", lines.join("\n    ")));
    }
    dot.push('}');
    dot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::environment;

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("0-code_build.rs now"), "0_code_build_rs_now");
        assert_eq!(sanitize_id("plain"), "plain");
    }

    #[test]
    fn test_node_id_uses_environment() {
        let goal = Goal::new("deploy").in_environment(environment::STAGING);
        assert_eq!(node_id(&goal), "1_staging_deploy");
    }

    #[test]
    fn test_single_goal_layout() {
        let goals = Goals::new("my goals", vec![Goal::new("build").with_display_name("Build")]);
        let expected = r#"digraph my_goals {
    fontname="Arial";
    splines="polyline";
    rankdir="LR";
    edge [arrowhead="vee"];
    node [shape=box, fontname="Arial", style="rounded"];

    0_code_build [label="Build"]
}"#;
        assert_eq!(goals_to_dot(&goals), expected);
    }

    #[test]
    fn test_labels_are_escaped() {
        let goal = Goal::new("say").with_display_name(r#"Say "hi" \ bye"#);
        let dot = goals_to_dot(&Goals::new("g", vec![goal]));
        assert!(dot.contains(r#"0_code_say [label="Say \"hi\" \\ bye"]"#));
    }

    #[test]
    fn test_empty_goal_set_has_no_blank_body() {
        let dot = goals_to_dot(&Goals::new("none", Vec::<Goal>::new()));
        assert!(dot.ends_with("style=\"rounded\"];\n}"));
        assert!(!dot.lines().any(|line| !line.is_empty() && line.trim().is_empty()));
    }
}
