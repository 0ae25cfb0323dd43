use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GearCategory {
    Knee,
    Wrist,
    Waist,
    Elbow,
    Ankle,
}

impl GearCategory {
    pub const ALL: [GearCategory; 5] = [Self::Knee, Self::Wrist, Self::Waist, Self::Elbow, Self::Ankle];

    pub fn label(self) -> &'static str {
        match self {
            Self::Knee => "Knee Pad",
            Self::Wrist => "Wrist Guard",
            Self::Waist => "Waist Support",
            Self::Elbow => "Elbow Pad",
            Self::Ankle => "Ankle Support",
        }
    }

    fn body_part(self) -> &'static str {
        match self {
            Self::Knee => "knee",
            Self::Wrist => "wrist",
            Self::Waist => "waist",
            Self::Elbow => "elbow",
            Self::Ankle => "ankle",
        }
    }

    /// Best-effort mapping of the model's free-text category onto the closed set.
    ///
    /// Tries label-contains-text, then text-contains-label, then
    /// text-contains-body-part, all case-insensitive. `None` means the caller
    /// keeps whatever category was selected before.
    pub fn from_analysis(text: &str) -> Option<Self> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        Self::ALL.into_iter()
            .find(|c| c.label().to_lowercase().contains(&needle))
            .or_else(|| Self::ALL.into_iter().find(|c| needle.contains(&c.label().to_lowercase())))
            .or_else(|| Self::ALL.into_iter().find(|c| needle.contains(c.body_part())))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DesignStyle {
    Professional,
    Medical,
    Trendy,
    Futuristic,
}

impl DesignStyle {
    pub const ALL: [DesignStyle; 4] = [Self::Professional, Self::Medical, Self::Trendy, Self::Futuristic];

    pub fn label(self) -> &'static str {
        match self {
            Self::Professional => "Sport Professional",
            Self::Medical => "Medical Rehab",
            Self::Trendy => "Fashion Street",
            Self::Futuristic => "Geometric/Futuristic",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaterialType {
    CarbonFiber,
    Silicone,
    Leather,
    ElasticMesh,
    HardShell,
}

impl MaterialType {
    pub const ALL: [MaterialType; 5] = [Self::CarbonFiber, Self::Silicone, Self::Leather, Self::ElasticMesh, Self::HardShell];

    pub fn label(self) -> &'static str {
        match self {
            Self::CarbonFiber => "Carbon Fiber",
            Self::Silicone => "Medical Silicone",
            Self::Leather => "Premium Leather",
            Self::ElasticMesh => "Breathable Elastic",
            Self::HardShell => "Polycabonate Shell",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scenario {
    Studio,
    Gym,
    Basketball,
    Clinic,
    Street,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [Self::Studio, Self::Gym, Self::Basketball, Self::Clinic, Self::Street];

    pub fn label(self) -> &'static str {
        match self {
            Self::Studio => "Clean Studio",
            Self::Gym => "Modern Gym",
            Self::Basketball => "Urban Basketball Court",
            Self::Clinic => "Rehab Center",
            Self::Street => "City Street",
        }
    }
}

/// The user-adjustable parameter set driving generation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DesignConfiguration {
    pub category: GearCategory,
    pub style: DesignStyle,
    pub material: MaterialType,
    pub scenario: Scenario,
    pub main_color: String,
    pub accent_color: String,
}

impl Default for DesignConfiguration {
    fn default() -> Self {
        Self {
            category: GearCategory::Knee,
            style: DesignStyle::Professional,
            material: MaterialType::ElasticMesh,
            scenario: Scenario::Studio,
            main_color: "#4f46e5".into(),
            accent_color: "#fbbf24".into(),
        }
    }
}

/// Partial update of the live configuration; absent fields are left alone.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    #[serde(default)]
    pub category: Option<GearCategory>,
    #[serde(default)]
    pub style: Option<DesignStyle>,
    #[serde(default)]
    pub material: Option<MaterialType>,
    #[serde(default)]
    pub scenario: Option<Scenario>,
    #[serde(default)]
    pub main_color: Option<String>,
    #[serde(default)]
    pub accent_color: Option<String>,
}

impl ConfigPatch {
    pub fn apply(self, config: &mut DesignConfiguration) {
        if let Some(v) = self.category { config.category = v; }
        if let Some(v) = self.style { config.style = v; }
        if let Some(v) = self.material { config.material = v; }
        if let Some(v) = self.scenario { config.scenario = v; }
        if let Some(v) = self.main_color { config.main_color = v; }
        if let Some(v) = self.accent_color { config.accent_color = v; }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum KeyPointKind {
    Joint,
    Strap,
    Pad,
}

impl Default for KeyPointKind {
    fn default() -> Self {
        Self::Pad
    }
}

// The model answers with free text here; anything unrecognised is padding.
impl From<String> for KeyPointKind {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "joint" => Self::Joint,
            "strap" => Self::Strap,
            _ => Self::Pad,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct KeyPoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: KeyPointKind,
}

/// Parsed analysis payload as returned by the analysis model.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GearAnalysis {
    pub category: String,
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub keypoints: Vec<KeyPoint>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GeneratedVariant {
    pub id: String,
    pub image_url: String,
    pub prompt_summary: String,
    pub created_at: DateTime<Utc>,
    pub config: DesignConfiguration,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SelectRequest {
    /// Either `original` or a variant id.
    pub target: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn category_matches_by_substring() {
        assert_eq!(GearCategory::from_analysis("knee"), Some(GearCategory::Knee));
        assert_eq!(GearCategory::from_analysis("WRIST GUARD"), Some(GearCategory::Wrist));
        assert_eq!(GearCategory::from_analysis("Pro Elbow Pad v2"), Some(GearCategory::Elbow));
    }

    #[test]
    fn category_falls_back_to_body_part() {
        assert_eq!(GearCategory::from_analysis("Knee Support"), Some(GearCategory::Knee));
        assert_eq!(GearCategory::from_analysis("ankle brace"), Some(GearCategory::Ankle));
    }

    #[test]
    fn category_miss_is_none() {
        assert_eq!(GearCategory::from_analysis("Helmet"), None);
        assert_eq!(GearCategory::from_analysis("   "), None);
    }

    #[test]
    fn keypoint_kind_tolerates_unknown_strings() {
        let raw = r#"[{"x":0.1,"y":0.2,"label":"hinge","type":"Joint"},
                      {"x":0.5,"y":0.5,"label":"band","type":"strap"},
                      {"x":0.9,"y":0.9,"type":"padding"}]"#;
        let points: Vec<KeyPoint> = serde_json::from_str(raw).unwrap();
        let kinds: Vec<_> = points.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![KeyPointKind::Joint, KeyPointKind::Strap, KeyPointKind::Pad]);
        assert_eq!(points[2].label, "");
        assert_eq!(serde_json::to_value(KeyPointKind::Strap).unwrap(), "strap");
    }

    #[test]
    fn keypoint_without_type_is_padding() {
        let raw = r#"{"category":"Knee Pad","analysis":"hinged shell",
                      "keypoints":[{"x":0.1,"y":0.2,"label":"hinge"},{"x":0.3,"y":0.4,"label":"band","type":"strap"}]}"#;
        let analysis: GearAnalysis = serde_json::from_str(raw).unwrap();
        assert_eq!(analysis.keypoints.len(), 2);
        assert_eq!(analysis.keypoints[0].kind, KeyPointKind::Pad);
        assert_eq!(analysis.keypoints[1].kind, KeyPointKind::Strap);
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let mut config = DesignConfiguration::default();
        let patch: ConfigPatch = serde_json::from_str(r##"{"style":"FUTURISTIC","main_color":"#000000"}"##).unwrap();
        patch.apply(&mut config);
        assert_eq!(config.style, DesignStyle::Futuristic);
        assert_eq!(config.main_color, "#000000");
        assert_eq!(config.category, GearCategory::Knee);
        assert_eq!(config.accent_color, "#fbbf24");
    }
}
