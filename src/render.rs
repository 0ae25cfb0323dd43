//! Server-side HTML for the studio page.

use crate::models::{DesignStyle, GearCategory, KeyPoint, KeyPointKind, MaterialType, Scenario};
use crate::session::{FailureKind, Operation, SessionState};
use std::fmt::Write;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Done,
    Active,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub number: u8,
    pub label: &'static str,
    pub status: StepStatus,
}

/// Upload / Analysis / Design indicators, derived from flags alone.
pub fn workflow_steps(state: &SessionState) -> [Step; 3] {
    let flag = |on: bool| if on { StepStatus::Active } else { StepStatus::Pending };
    [
        Step {
            number: 1,
            label: "Upload",
            status: if state.original_image.is_some() { StepStatus::Done } else { StepStatus::Pending },
        },
        Step { number: 2, label: "Analysis", status: flag(state.processing) },
        Step { number: 3, label: "Design", status: flag(state.generating) },
    ]
}

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn kind_class(kind: KeyPointKind) -> &'static str {
    match kind {
        KeyPointKind::Joint => "kp-joint",
        KeyPointKind::Strap => "kp-strap",
        KeyPointKind::Pad => "kp-pad",
    }
}

fn percent(v: f64) -> String {
    format!("{:.2}%", v.clamp(0.0, 1.0) * 100.0)
}

pub fn render_studio(id: Uuid, state: &SessionState) -> String {
    let base = format!("/studio/{id}");
    let refresh = if state.is_busy() { r#"<meta http-equiv="refresh" content="2">"# } else { "" };
    let mut body = String::new();
    body.push_str(&sidebar(&base, state));
    body.push_str(r#"<div class="workspace">"#);
    body.push_str(&header(id, &base, state));
    body.push_str(r#"<main class="stage">"#);
    body.push_str(&failure_notice(state));
    body.push_str(&overlay_controls(&base, state));
    body.push_str(&viewport(state));
    body.push_str(&analysis_panel(state));
    body.push_str(&history(&base, state));
    body.push_str("</main></div>");
    body.push_str(&modal(state));

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
{refresh}
<title>GuardAI Studio</title>
<link rel="stylesheet" href="/static/studio.css">
</head>
<body>
{body}
</body>
</html>"#
    )
}

fn sidebar(base: &str, state: &SessionState) -> String {
    let config = &state.config;
    let mut out = String::from(r#"<aside class="sidebar"><div class="brand"><h1>GuardAI Studio</h1><p>Advanced Gear Designer</p></div>"#);
    let _ = write!(out, r#"<form class="controls" method="post" action="{base}/configure">"#);

    out.push_str(r#"<section><label>Category</label><div class="choices">"#);
    for cat in GearCategory::ALL {
        let selected = if cat == config.category { " selected" } else { "" };
        let _ = write!(
            out,
            r#"<button type="submit" name="category" value="{}" class="choice{selected}">{}</button>"#,
            wire_name(&cat),
            cat.label()
        );
    }
    out.push_str("</div></section>");

    out.push_str(&dropdown("style", "Design Concept", DesignStyle::ALL.iter().map(|s| (wire_name(s), s.label(), *s == config.style))));

    out.push_str(r#"<section><label>Primary Material</label><div class="choices">"#);
    for mat in MaterialType::ALL {
        let selected = if mat == config.material { " selected" } else { "" };
        let _ = write!(
            out,
            r#"<button type="submit" name="material" value="{}" class="choice outline{selected}">{}</button>"#,
            wire_name(&mat),
            mat.label()
        );
    }
    out.push_str("</div></section>");

    let _ = write!(
        out,
        r#"<section><label>Color Palette</label><div class="colors">
<span>Primary<input type="color" name="main_color" value="{}" onchange="this.form.submit()"></span>
<span>Accent<input type="color" name="accent_color" value="{}" onchange="this.form.submit()"></span>
</div></section>"#,
        escape(&config.main_color),
        escape(&config.accent_color)
    );

    out.push_str(&dropdown("scenario", "Context Scene", Scenario::ALL.iter().map(|s| (wire_name(s), s.label(), *s == config.scenario))));
    out.push_str("</form>");

    let disabled = if state.generating { " disabled" } else { "" };
    let label = if state.generating { "Generating..." } else { "Generate Design" };
    let _ = write!(
        out,
        r#"<form class="generate" method="post" action="{base}/generate"><button type="submit" class="primary"{disabled}>{label}</button></form></aside>"#
    );
    out
}

fn dropdown<'a>(name: &str, title: &str, options: impl Iterator<Item = (String, &'a str, bool)>) -> String {
    let mut out = format!(r#"<section><label>{title}</label><select name="{name}" onchange="this.form.submit()">"#);
    for (value, label, selected) in options {
        let selected = if selected { " selected" } else { "" };
        let _ = write!(out, r#"<option value="{value}"{selected}>{}</option>"#, escape(label));
    }
    out.push_str("</select></section>");
    out
}

/// The SCREAMING_SNAKE name the forms post back.
fn wire_name<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn header(id: Uuid, base: &str, state: &SessionState) -> String {
    let mut out = String::from(r#"<header class="topbar"><ol class="steps">"#);
    for step in workflow_steps(state) {
        let (class, mark) = match step.status {
            StepStatus::Done => ("done", "✓".to_string()),
            StepStatus::Active => ("active", step.number.to_string()),
            StepStatus::Pending => ("pending", step.number.to_string()),
        };
        let _ = write!(out, r#"<li class="step {class}"><span class="dot">{mark}</span>{}</li>"#, step.label);
    }
    out.push_str("</ol>");
    let _ = write!(
        out,
        r#"<div class="actions"><form method="post" action="{base}/upload" enctype="multipart/form-data">
<label class="button">Source Image<input type="file" name="image" accept="image/*" hidden onchange="this.form.submit()"></label>
</form>"#
    );
    if state.active_image.is_some() {
        let _ = write!(out, r#"<a class="button" href="/api/sessions/{id}/image" download>Download</a>"#);
    }
    let _ = write!(out, r#"<a class="button" href="/api/sessions/{id}/pdf">Report</a></div></header>"#);
    out
}

fn failure_notice(state: &SessionState) -> String {
    let Some(failure) = &state.last_failure else {
        return String::new();
    };
    let what = match failure.operation {
        Operation::Analysis => "Analysis",
        Operation::Generation => "Generation",
    };
    let why = match failure.kind {
        FailureKind::Network => "the service could not be reached",
        FailureKind::MalformedResponse => "the service returned an unusable answer",
        FailureKind::Interrupted => "the request was abandoned",
    };
    format!(r#"<div class="notice">{what} failed: {why}.</div>"#)
}

fn overlay_controls(base: &str, state: &SessionState) -> String {
    if state.active_image.is_none() || state.keypoints.is_empty() {
        return String::new();
    }
    let (class, text) = if state.overlay_visible {
        ("toggle on", "VISUALIZING STRUCTURE")
    } else {
        ("toggle", "SHOW STRUCTURE")
    };
    let mut out = format!(
        r#"<div class="overlay-controls"><form method="post" action="{base}/overlay"><button type="submit" class="{class}">{text}</button></form>"#
    );
    if state.processing {
        out.push_str(r#"<span class="badge">AI ANALYZING...</span>"#);
    }
    out.push_str("</div>");
    out
}

fn marker(point: &KeyPoint) -> String {
    format!(
        r#"<div class="marker" style="left:{};top:{}"><span class="pin {}"></span><span class="tip">{}</span></div>"#,
        percent(point.x),
        percent(point.y),
        kind_class(point.kind),
        escape(&point.label)
    )
}

fn viewport(state: &SessionState) -> String {
    let Some(image) = &state.active_image else {
        return String::from(
            r#"<div class="viewport empty"><p class="lead">Upload a photo to start designing</p><p>AI will automatically detect functional parts and structures</p></div>"#,
        );
    };
    let mut out = format!(r#"<div class="viewport"><div class="frame"><img src="{}" alt="Design Preview">"#, escape(image));
    if state.overlay_visible {
        for point in &state.keypoints {
            out.push_str(&marker(point));
        }
    }
    out.push_str(
        r#"<div class="legend"><span><i class="kp-joint"></i>Joints</span><span><i class="kp-strap"></i>Straps</span><span><i class="kp-pad"></i>Padding</span></div></div></div>"#,
    );
    out
}

fn analysis_panel(state: &SessionState) -> String {
    match state.analysis.as_deref() {
        Some(text) if !text.trim().is_empty() => format!(r#"<details class="analysis"><summary>Analysis</summary><p>{}</p></details>"#, escape(text)),
        _ => String::new(),
    }
}

fn history(base: &str, state: &SessionState) -> String {
    if state.variants.is_empty() {
        return String::new();
    }
    let is_active = |url: Option<&str>| if url.is_some() && state.active_image.as_deref() == url { " current" } else { "" };
    let mut out = format!(
        r#"<section class="history"><h3>Design History <small>{} variations generated</small></h3><div class="strip">"#,
        state.variants.len()
    );
    if let Some(original) = &state.original_image {
        let _ = write!(
            out,
            r#"<form method="post" action="{base}/select"><input type="hidden" name="target" value="original"><button type="submit" class="thumb{}"><img src="{}" alt="Original"><span>Original</span></button></form>"#,
            is_active(Some(original.as_str())),
            escape(original)
        );
    }
    for v in &state.variants {
        let id = escape(&v.id);
        let _ = write!(
            out,
            r#"<div class="variant"><form method="post" action="{base}/select"><input type="hidden" name="target" value="{id}"><button type="submit" class="thumb{}" title="{}"><img src="{}" alt="{}"></button></form><form method="post" action="{base}/variants/{id}/delete"><button type="submit" class="delete" title="Delete">×</button></form></div>"#,
            is_active(Some(v.image_url.as_str())),
            escape(&v.prompt_summary),
            escape(&v.image_url),
            escape(&v.prompt_summary)
        );
    }
    out.push_str("</div></section>");
    out
}

fn modal(state: &SessionState) -> String {
    if !state.generating {
        return String::new();
    }
    let config = &state.config;
    format!(
        r#"<div class="modal"><div class="card"><h3>Dreaming up new designs...</h3><p>Applying {} textures and {} logic to your {}.</p><div class="bar"><div></div></div></div></div>"#,
        config.material.label(),
        config.style.label(),
        config.category.label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DesignConfiguration, GeneratedVariant};
    use crate::session::{reduce, Action};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn with_image() -> SessionState {
        reduce(SessionState::default(), Action::ImageUploaded { data_uri: "data:image/png;base64,AAAA".into() })
    }

    #[test]
    fn empty_session_prompts_for_upload() {
        let html = render_studio(Uuid::nil(), &SessionState::default());
        assert!(html.contains("Upload a photo to start designing"));
        assert!(!html.contains("Design History"));
        assert!(!html.contains("http-equiv=\"refresh\""));
    }

    #[test]
    fn steps_follow_flags() {
        let state = SessionState::default();
        let statuses: Vec<_> = workflow_steps(&state).iter().map(|s| s.status).collect();
        assert_eq!(statuses, vec![StepStatus::Pending; 3]);

        let mut state = with_image();
        state.generating = true;
        let statuses: Vec<_> = workflow_steps(&state).iter().map(|s| s.status).collect();
        assert_eq!(statuses, vec![StepStatus::Done, StepStatus::Active, StepStatus::Active]);
    }

    #[test]
    fn markers_are_positioned_and_escaped() {
        let mut state = with_image();
        state.processing = false;
        state.keypoints = vec![
            KeyPoint { x: 0.25, y: 0.75, label: "<strap>".into(), kind: KeyPointKind::Strap },
            KeyPoint { x: 1.4, y: -0.2, label: "edge".into(), kind: KeyPointKind::Pad },
        ];
        let html = render_studio(Uuid::nil(), &state);
        assert!(html.contains(r#"style="left:25.00%;top:75.00%""#));
        assert!(html.contains(r#"style="left:100.00%;top:0.00%""#));
        assert!(html.contains("kp-strap"));
        assert!(html.contains("&lt;strap&gt;"));
        assert!(html.contains("VISUALIZING STRUCTURE"));
    }

    #[test]
    fn hidden_overlay_drops_markers() {
        let mut state = with_image();
        state.keypoints = vec![KeyPoint { x: 0.5, y: 0.5, label: "hinge".into(), kind: KeyPointKind::Joint }];
        state.overlay_visible = false;
        let html = render_studio(Uuid::nil(), &state);
        assert!(!html.contains(r#"class="marker""#));
        assert!(html.contains("SHOW STRUCTURE"));
        assert!(html.contains("AI ANALYZING..."));
    }

    #[test]
    fn generating_shows_modal_and_disables_button() {
        let mut state = with_image();
        state.generating = true;
        let html = render_studio(Uuid::nil(), &state);
        assert!(html.contains("Dreaming up new designs..."));
        assert!(html.contains("Applying Breathable Elastic textures and Sport Professional logic to your Knee Pad."));
        assert!(html.contains(r#"class="primary" disabled"#));
        assert!(html.contains("http-equiv=\"refresh\""));
    }

    #[test]
    fn history_marks_current_thumbnail() {
        let mut state = with_image();
        state.variants.push(GeneratedVariant {
            id: "42".into(),
            image_url: "data:image/png;base64,BBBB".into(),
            prompt_summary: "New Sport Professional Knee Pad".into(),
            created_at: Utc::now(),
            config: DesignConfiguration::default(),
        });
        state.active_image = Some("data:image/png;base64,BBBB".into());
        let html = render_studio(Uuid::nil(), &state);
        assert!(html.contains("1 variations generated"));
        assert!(html.contains(r#"class="thumb current" title="New Sport Professional Knee Pad""#));
        assert!(html.contains("/variants/42/delete"));
        assert!(html.contains(r#"<button type="submit" class="thumb"><img src="data:image/png;base64,AAAA""#));
    }

    #[test]
    fn controls_post_wire_names() {
        let html = render_studio(Uuid::nil(), &SessionState::default());
        assert!(html.contains(r#"name="category" value="KNEE" class="choice selected""#));
        assert!(html.contains(r#"name="material" value="ELASTIC_MESH" class="choice outline selected""#));
        assert!(html.contains(r#"<option value="FUTURISTIC">Geometric/Futuristic</option>"#));
        assert!(html.contains(r##"name="main_color" value="#4f46e5""##));
    }
}
