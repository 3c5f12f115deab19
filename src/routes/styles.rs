use axum::Json;
use imagent::Style;
use serde::Serialize;

/// One entry of the style dropdown.
#[derive(Serialize)]
pub struct StyleInfo {
    pub name: &'static str,
    pub slug: String,
    pub description: &'static str,
    pub prefix: &'static str,
    pub suffix: &'static str,
}

/// GET /api/styles -- every preset in catalog order.
pub async fn list_styles() -> Json<Vec<StyleInfo>> {
    let styles = Style::ALL
        .iter()
        .map(|style| {
            let preset = style.preset();
            StyleInfo {
                name: style.name(),
                slug: style.slug(),
                description: preset.description,
                prefix: preset.prefix,
                suffix: preset.suffix,
            }
        })
        .collect();
    Json(styles)
}
