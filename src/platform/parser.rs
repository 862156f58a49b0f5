//! Platform response parser
//!
//! Stateless functions turning platform JSON into typed values.

use super::{PlatformError, PlatformResult};
use crate::{SceneId, Tile};
use serde_json::Value;

/// One page of the tile grid
#[derive(Debug, Clone, PartialEq)]
pub struct TilePage {
    /// Tiles in platform order
    pub tiles: Vec<Tile>,
    /// Token for the following page; `None` on the last page
    pub next_page_token: Option<String>,
}

/// Stateless parser for platform responses
pub struct PlatformParser;

impl PlatformParser {
    /// Parse a tile feature
    ///
    /// # Format
    /// `{"type": "Feature", "geometry": {..}, "properties": {"key": "..",
    /// "tilesize": 512, "resolution": 30.0, "pad": 0, ..}}`
    ///
    /// The feature is kept verbatim on the tile so per-tile requests can pass
    /// it back unchanged.
    pub fn parse_tile(feature: Value) -> PlatformResult<Tile> {
        let properties = feature
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| PlatformError::ParseError("Tile feature has no properties".to_string()))?;

        let key = properties
            .get("key")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PlatformError::ParseError("Tile feature has no key".to_string()))?
            .to_string();

        let tilesize = properties
            .get("tilesize")
            .and_then(Value::as_u64)
            .and_then(|t| u32::try_from(t).ok())
            .ok_or_else(|| PlatformError::ParseError(format!("Invalid tilesize for tile {key}")))?;

        let resolution = properties
            .get("resolution")
            .and_then(Value::as_f64)
            .ok_or_else(|| PlatformError::ParseError(format!("Invalid resolution for tile {key}")))?;

        let pad = properties
            .get("pad")
            .and_then(Value::as_u64)
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or(0);

        let geometry = feature.get("geometry").cloned().unwrap_or(Value::Null);

        Ok(Tile {
            key,
            geometry,
            tilesize,
            resolution,
            pad,
            feature,
        })
    }

    /// Parse a tile grid page: `{"features": [..], "next_page_token": ".."}`
    pub fn parse_tile_page(page: Value) -> PlatformResult<TilePage> {
        let Value::Object(mut page) = page else {
            return Err(PlatformError::InvalidResponse(
                "Tile page is not an object".to_string(),
            ));
        };

        let features = match page.remove("features") {
            Some(Value::Array(features)) => features,
            Some(_) => {
                return Err(PlatformError::InvalidResponse(
                    "Tile page features is not an array".to_string(),
                ))
            }
            None => Vec::new(),
        };

        let tiles = features
            .into_iter()
            .map(Self::parse_tile)
            .collect::<PlatformResult<Vec<_>>>()?;

        let next_page_token = page
            .get("next_page_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Ok(TilePage {
            tiles,
            next_page_token,
        })
    }

    /// Parse a catalog id search response
    ///
    /// Accepts a bare array of ids or an array of objects carrying an `id` field.
    pub fn parse_scene_ids(response: Value) -> PlatformResult<Vec<SceneId>> {
        let items = response.as_array().ok_or_else(|| {
            PlatformError::InvalidResponse("Search response is not an array".to_string())
        })?;

        items
            .iter()
            .map(|item| {
                item.as_str()
                    .or_else(|| item.get("id").and_then(Value::as_str))
                    .map(SceneId::from)
                    .ok_or_else(|| PlatformError::ParseError(format!("Invalid scene id: {item}")))
            })
            .collect()
    }
}
