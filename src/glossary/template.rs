pub(crate) const LEFT: &str = "{L}";
pub(crate) const RIGHT: &str = "{R}";
pub(crate) const JOINER: &str = "{J}";

pub(crate) fn uses_right(template: &str) -> bool {
    template.contains(RIGHT)
}

/// Substitutes the placeholders. A missing right side renders as empty.
pub(crate) fn render(template: &str, left: &str, right: Option<&str>, joiner: &str) -> String {
    template
        .replace(LEFT, left)
        .replace(RIGHT, right.unwrap_or(""))
        .replace(JOINER, joiner)
}

/// First template whose placeholders are all supplied, else the first one, else a default.
pub(crate) fn select_target_template(templates: &[String], has_right: bool) -> String {
    let supplied = templates
        .iter()
        .find(|t| t.contains(LEFT) && (has_right || !uses_right(t)));
    match supplied.or_else(|| templates.first()) {
        Some(t) => t.clone(),
        None if has_right => format!("{LEFT} {RIGHT}"),
        None => LEFT.to_string(),
    }
}
