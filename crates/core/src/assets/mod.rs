use std::{collections::HashMap, sync::Arc};

use serde_json::{json, Value};
use tracing::debug;

use crate::{BeatSyncError, Result, VisualizerStyle};

const WAVEFORM_JSON: &str = include_str!("../../assets/waveform.json");
const BARS_JSON: &str = include_str!("../../assets/bars.json");
const PARTICLES_JSON: &str = include_str!("../../assets/particles.json");

/// Immutable Lottie-style animation document.
///
/// Templates are shared behind an [`Arc`] and never handed out mutably;
/// variations are made with [`AnimationTemplate::patch`], which works on a
/// deep copy.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationTemplate {
    name: String,
    data: Value,
}

impl AnimationTemplate {
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self> {
        let data: Value = serde_json::from_str(json)?;
        if !data.get("layers").is_some_and(Value::is_array) {
            return Err(BeatSyncError::invalid("animation template has no layers"));
        }
        Ok(Self {
            name: name.into(),
            data,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn frame_rate(&self) -> f64 {
        self.data.get("fr").and_then(Value::as_f64).unwrap_or(30.0)
    }

    /// Number of frames between the in and out points.
    pub fn total_frames(&self) -> f64 {
        let in_point = self.data.get("ip").and_then(Value::as_f64).unwrap_or(0.0);
        let out_point = self.data.get("op").and_then(Value::as_f64).unwrap_or(0.0);
        (out_point - in_point).max(0.0)
    }

    /// Starts a patch on a private copy of this template.
    pub fn patch(&self) -> TemplatePatch {
        TemplatePatch {
            name: self.name.clone(),
            data: self.data.clone(),
        }
    }
}

/// Copy-then-patch builder producing a derived [`AnimationTemplate`].
#[derive(Debug, Clone)]
pub struct TemplatePatch {
    name: String,
    data: Value,
}

impl TemplatePatch {
    /// Rewrites every colour property (`c.k` holding four components in
    /// `[0, 1]`) below `layers`. Nothing else is touched.
    pub fn recolor(mut self, rgba: [f64; 4]) -> Self {
        if let Some(layers) = self.data.get_mut("layers") {
            let replaced = replace_colors(layers, &rgba);
            debug!(template = %self.name, replaced, "recoloured animation template");
        }
        self
    }

    /// Replaces the fill of the first shape group with a stroke of `width`,
    /// which is how the waveform gets its thickness.
    pub fn fill_to_stroke(mut self, width: f64, rgba: [f64; 4]) -> Result<Self> {
        let items = self
            .data
            .pointer_mut("/layers/0/shapes/0/it")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| {
                BeatSyncError::invalid(format!("template `{}` has no shape group", self.name))
            })?;

        let fill = items
            .iter()
            .position(|item| item.get("ty").and_then(Value::as_str) == Some("fl"))
            .ok_or_else(|| {
                BeatSyncError::invalid(format!("template `{}` has no fill to stroke", self.name))
            })?;

        items[fill] = json!({
            "ty": "st",
            "nm": "Dynamic Stroke",
            "o": { "a": 0, "k": 100 },
            "c": { "a": 0, "k": rgba },
            "w": { "a": 0, "k": width },
        });
        Ok(self)
    }

    pub fn build(self) -> AnimationTemplate {
        AnimationTemplate {
            name: self.name,
            data: self.data,
        }
    }
}

fn is_color(value: &Value) -> bool {
    value.as_array().is_some_and(|components| {
        components.len() == 4
            && components
                .iter()
                .all(|c| c.as_f64().is_some_and(|c| (0.0..=1.0).contains(&c)))
    })
}

fn replace_colors(node: &mut Value, rgba: &[f64; 4]) -> usize {
    match node {
        Value::Object(map) => {
            let mut replaced = 0;
            if let Some(k) = map.get_mut("c").and_then(|c| c.get_mut("k")) {
                if is_color(k) {
                    *k = json!(rgba);
                    replaced += 1;
                }
            }
            for child in map.values_mut() {
                replaced += replace_colors(child, rgba);
            }
            replaced
        }
        Value::Array(items) => items.iter_mut().map(|item| replace_colors(item, rgba)).sum(),
        _ => 0,
    }
}

/// Registry of the templates each visualizer style starts from.
#[derive(Debug, Default, Clone)]
pub struct AssetStore {
    templates: HashMap<VisualizerStyle, Arc<AnimationTemplate>>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Store holding the bundled Waveform, Bars and Particles templates.
    pub fn builtin() -> Result<Self> {
        let mut store = Self::new();
        store.register(
            VisualizerStyle::Waveform,
            AnimationTemplate::from_json("Waveform", WAVEFORM_JSON)?,
        );
        store.register(
            VisualizerStyle::Bars,
            AnimationTemplate::from_json("Bars", BARS_JSON)?,
        );
        store.register(
            VisualizerStyle::Particles,
            AnimationTemplate::from_json("Particles", PARTICLES_JSON)?,
        );
        Ok(store)
    }

    pub fn register(&mut self, style: VisualizerStyle, template: AnimationTemplate) {
        self.templates.insert(style, Arc::new(template));
    }

    pub fn template(&self, style: VisualizerStyle) -> Result<Arc<AnimationTemplate>> {
        self.templates.get(&style).cloned().ok_or_else(|| {
            BeatSyncError::invalid(format!("no animation template registered for {style}"))
        })
    }
}
