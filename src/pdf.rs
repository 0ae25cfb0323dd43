use crate::models::DesignConfiguration;
use crate::session::SessionState;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use std::io::BufWriter;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("PDF export failed: {0}")]
pub struct ReportError(String);

/// Text-only design report: a summary page, then one page per variant.
pub fn generate_report(state: &SessionState) -> Result<Vec<u8>, ReportError> {
    let (doc, page, layer) = PdfDocument::new("GuardAI Studio design report", Mm(210.0), Mm(297.0), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReportError(format!("{e:?}")))?;

    let summary = doc.get_page(page).get_layer(layer);
    summary.use_text("GuardAI Studio Design Report", 20.0, Mm(15.0), Mm(275.0), &font);
    let mut y = 260.0;
    for line in config_lines("Current configuration", &state.config) {
        summary.use_text(line, 10.0, Mm(15.0), Mm(y), &font);
        y -= 7.0;
    }
    y -= 5.0;
    summary.use_text(format!("Detected keypoints: {}", state.keypoints.len()), 10.0, Mm(15.0), Mm(y), &font);
    y -= 7.0;
    if let Some(analysis) = &state.analysis {
        summary.use_text(truncate(analysis, 140), 9.0, Mm(15.0), Mm(y), &font);
        y -= 7.0;
    }
    summary.use_text(format!("Variants generated: {}", state.variants.len()), 10.0, Mm(15.0), Mm(y), &font);
    summary.use_text("(Images not embedded in the report)", 8.0, Mm(15.0), Mm(y - 12.0), &font);

    for variant in &state.variants {
        let (page, layer) = doc.add_page(Mm(210.0), Mm(297.0), format!("Variant {}", variant.id));
        let layer_ref = doc.get_page(page).get_layer(layer);
        layer_ref.use_text(&variant.prompt_summary, 16.0, Mm(15.0), Mm(275.0), &font);
        layer_ref.use_text(
            format!("Variant {} created {}", variant.id, variant.created_at.format("%Y-%m-%d %H:%M:%S UTC")),
            9.0,
            Mm(15.0),
            Mm(265.0),
            &font,
        );
        let mut y = 250.0;
        for line in config_lines("Configuration", &variant.config) {
            layer_ref.use_text(line, 10.0, Mm(15.0), Mm(y), &font);
            y -= 7.0;
        }
    }

    let mut buf: Vec<u8> = Vec::new();
    {
        let mut writer = BufWriter::new(&mut buf);
        doc.save(&mut writer).map_err(|e| ReportError(format!("{e:?}")))?;
    }
    Ok(buf)
}

fn config_lines(title: &str, config: &DesignConfiguration) -> Vec<String> {
    vec![
        title.to_string(),
        format!("Category: {}", config.category.label()),
        format!("Style: {}", config.style.label()),
        format!("Material: {}", config.material.label()),
        format!("Scene: {}", config.scenario.label()),
        format!("Colors: main {} / accent {}", config.main_color, config.accent_color),
    ]
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max { s.to_string() } else { format!("{}…", s.chars().take(max).collect::<String>()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeneratedVariant;
    use chrono::Utc;

    #[test]
    fn report_is_a_pdf_with_a_page_per_variant() {
        let mut state = SessionState::default();
        state.analysis = Some("Hinged knee brace".into());
        for id in ["1", "2"] {
            state.variants.push(GeneratedVariant {
                id: id.into(),
                image_url: "data:image/png;base64,AAAA".into(),
                prompt_summary: "New Sport Professional Knee Pad".into(),
                created_at: Utc::now(),
                config: DesignConfiguration::default(),
            });
        }
        let bytes = generate_report(&state).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("ééé", 2), "éé…");
        assert_eq!(truncate("short", 10), "short");
    }
}
