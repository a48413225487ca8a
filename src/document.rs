//! Catalog, collection and item documents as written to the object store.
//!
//! Extension metadata (product definition, projection, eo) is attached as [`PropertyBag`]s whose
//! entries are merged into the owning object's additional fields as `tag:field` keys.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const STAC_VERSION: &str = "1.0.0";
pub const COG_MEDIA_TYPE: &str = "image/tiff; application=geotiff; profile=cloud-optimized";
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// A group of extension fields sharing a tag, e.g. `proj:epsg` and `proj:shape`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyBag {
    tag: &'static str,
    fields: Map<String, Value>,
}

impl PropertyBag {
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            fields: Map::new(),
        }
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_owned(), value.into());
        self
    }

    /// Merges the bag into `target`, overwriting fields with the same tagged key.
    pub fn merge_into(self, target: &mut Map<String, Value>) {
        for (field, value) in self.fields {
            target.insert(format!("{}:{}", self.tag, field), value);
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Link {
    pub rel: String,
    pub href: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Link {
    pub fn new(rel: &str, href: impl Into<String>) -> Self {
        Self {
            rel: rel.to_owned(),
            href: href.into(),
            media_type: Some(JSON_MEDIA_TYPE.to_owned()),
            title: None,
        }
    }

    pub fn title(mut self, title: Option<&str>) -> Self {
        self.title = title.map(str::to_owned);
        self
    }
}

/// Appends `link` unless a link with the same rel and href is already present.
pub fn push_link(links: &mut Vec<Link>, link: Link) -> bool {
    if links.iter().any(|l| l.rel == link.rel && l.href == link.href) {
        return false;
    }
    links.push(link);
    true
}

/// Replaces any link with the same rel (root, self, parent, ...).
fn set_link(links: &mut Vec<Link>, link: Link) {
    links.retain(|l| l.rel != link.rel);
    links.push(link);
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Catalog {
    #[serde(rename = "type")]
    pub r#type: String,
    pub stac_version: String,
    #[serde(default)]
    pub stac_extensions: Vec<String>,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(flatten)]
    pub additional_fields: Map<String, Value>,
}

impl Catalog {
    pub fn new(id: &str, title: Option<&str>, description: &str, extensions: &[String]) -> Self {
        Self {
            r#type: "Catalog".to_owned(),
            stac_version: STAC_VERSION.to_owned(),
            stac_extensions: extensions.to_vec(),
            id: id.to_owned(),
            title: title.map(str::to_owned),
            description: description.to_owned(),
            links: vec![],
            additional_fields: Map::new(),
        }
    }

    pub fn set_self_href(&mut self, href: &str) {
        set_link(&mut self.links, Link::new("root", href));
        set_link(&mut self.links, Link::new("self", href));
    }

    pub fn children(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|l| l.rel == "child")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Provider {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpatialExtent {
    pub bbox: Vec<[f64; 4]>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TemporalExtent {
    pub interval: Vec<[Option<DateTime<Utc>>; 2]>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Extent {
    pub spatial: SpatialExtent,
    pub temporal: TemporalExtent,
}

impl Default for Extent {
    fn default() -> Self {
        Self {
            spatial: SpatialExtent {
                bbox: vec![[0.0, 0.0, 0.0, 0.0]],
            },
            temporal: TemporalExtent {
                interval: vec![[None, None]],
            },
        }
    }
}

impl Extent {
    /// Union of the given item bboxes and datetimes. Items without a bbox or datetime don't
    /// contribute to that half of the extent.
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a Item>) -> Self {
        let mut bbox: Option<[f64; 4]> = None;
        let mut start: Option<DateTime<Utc>> = None;
        let mut end: Option<DateTime<Utc>> = None;

        for item in items {
            if let Some(b) = item.bbox {
                bbox = Some(match bbox {
                    None => b,
                    Some(u) => [u[0].min(b[0]), u[1].min(b[1]), u[2].max(b[2]), u[3].max(b[3])],
                });
            }
            if let Some(dt) = item.properties.datetime {
                start = Some(start.map_or(dt, |s| s.min(dt)));
                end = Some(end.map_or(dt, |e| e.max(dt)));
            }
        }

        let default = Self::default();
        Self {
            spatial: SpatialExtent {
                bbox: bbox.map(|b| vec![b]).unwrap_or(default.spatial.bbox),
            },
            temporal: TemporalExtent {
                interval: vec![[start, end]],
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Collection {
    #[serde(rename = "type")]
    pub r#type: String,
    pub stac_version: String,
    #[serde(default)]
    pub stac_extensions: Vec<String>,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    pub license: String,
    #[serde(default)]
    pub providers: Vec<Provider>,
    pub extent: Extent,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(flatten)]
    pub additional_fields: Map<String, Value>,
}

impl Collection {
    pub fn new(id: &str, title: Option<&str>, description: &str) -> Self {
        Self {
            r#type: "Collection".to_owned(),
            stac_version: STAC_VERSION.to_owned(),
            stac_extensions: vec![],
            id: id.to_owned(),
            title: title.map(str::to_owned),
            description: description.to_owned(),
            license: "proprietary".to_owned(),
            providers: vec![],
            extent: Extent::default(),
            links: vec![],
            additional_fields: Map::new(),
        }
    }

    pub fn set_hrefs(&mut self, self_href: &str, catalog_href: &str) {
        set_link(&mut self.links, Link::new("root", catalog_href));
        set_link(&mut self.links, Link::new("parent", catalog_href));
        set_link(&mut self.links, Link::new("self", self_href));
    }

    pub fn items(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|l| l.rel == "item")
    }

    pub fn add_properties(&mut self, bag: PropertyBag) {
        bag.merge_into(&mut self.additional_fields);
    }
}

/// GeoJSON polygon. An empty polygon has no rings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub r#type: String,
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Properties {
    pub datetime: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub additional_fields: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Asset {
    pub href: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub additional_fields: Map<String, Value>,
}

impl Asset {
    pub fn new(href: impl Into<String>, media_type: &str) -> Self {
        Self {
            href: href.into(),
            media_type: Some(media_type.to_owned()),
            title: None,
            additional_fields: Map::new(),
        }
    }

    pub fn add_properties(&mut self, bag: PropertyBag) {
        bag.merge_into(&mut self.additional_fields);
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Item {
    #[serde(rename = "type")]
    pub r#type: String,
    pub stac_version: String,
    #[serde(default)]
    pub stac_extensions: Vec<String>,
    pub id: String,
    pub geometry: Geometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    pub properties: Properties,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub assets: BTreeMap<String, Asset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl Item {
    pub fn new(id: &str, datetime: Option<DateTime<Utc>>, geometry: Geometry) -> Self {
        Self {
            r#type: "Feature".to_owned(),
            stac_version: STAC_VERSION.to_owned(),
            stac_extensions: vec![],
            id: id.to_owned(),
            geometry,
            bbox: None,
            properties: Properties {
                datetime,
                additional_fields: Map::new(),
            },
            links: vec![],
            assets: BTreeMap::new(),
            collection: None,
        }
    }

    pub fn set_hrefs(&mut self, self_href: &str, collection_href: &str, catalog_href: &str) {
        set_link(&mut self.links, Link::new("root", catalog_href));
        set_link(&mut self.links, Link::new("parent", collection_href));
        set_link(&mut self.links, Link::new("collection", collection_href));
        set_link(&mut self.links, Link::new("self", self_href));
    }

    pub fn add_properties(&mut self, bag: PropertyBag) {
        bag.merge_into(&mut self.properties.additional_fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(bbox: Option<[f64; 4]>, datetime: Option<DateTime<Utc>>) -> Item {
        let geometry = Geometry {
            r#type: "Polygon".to_owned(),
            coordinates: vec![],
        };
        let mut item = Item::new("id", datetime, geometry);
        item.bbox = bbox;
        item
    }

    #[test]
    fn test_property_bag_merges_tagged_keys() {
        let mut asset = Asset::new("https://example.com/a.tif", COG_MEDIA_TYPE);
        asset.add_properties(PropertyBag::new("proj").with("shape", vec![10, 20]));
        assert_eq!(
            asset.additional_fields.get("proj:shape"),
            Some(&serde_json::json!([10, 20]))
        );

        let value = serde_json::to_value(&asset).unwrap();
        assert_eq!(value["proj:shape"], serde_json::json!([10, 20]));
        assert_eq!(value["type"], COG_MEDIA_TYPE);
    }

    #[test]
    fn test_push_link_is_idempotent() {
        let mut links = vec![];
        assert!(push_link(&mut links, Link::new("child", "a/collection.json")));
        assert!(!push_link(&mut links, Link::new("child", "a/collection.json")));
        assert!(push_link(&mut links, Link::new("item", "a/collection.json")));
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn test_extent_from_items() {
        let t1 = Utc.with_ymd_and_hms(1992, 1, 25, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(1990, 6, 1, 0, 0, 0).unwrap();
        let t3 = Utc.with_ymd_and_hms(1995, 3, 9, 0, 0, 0).unwrap();
        let items = vec![
            item(Some([10.0, 20.0, 30.0, 40.0]), Some(t1)),
            item(Some([5.0, 25.0, 25.0, 45.0]), Some(t2)),
            item(None, Some(t3)),
            item(Some([12.0, 15.0, 31.0, 35.0]), None),
        ];

        let extent = Extent::from_items(&items);
        assert_eq!(extent.spatial.bbox, vec![[5.0, 15.0, 31.0, 45.0]]);
        assert_eq!(extent.temporal.interval, vec![[Some(t2), Some(t3)]]);
    }

    #[test]
    fn test_extent_from_no_items_is_placeholder() {
        let extent = Extent::from_items(&Vec::<Item>::new());
        assert_eq!(extent, Extent::default());
    }

    #[test]
    fn test_item_serializes_null_datetime() {
        let value = serde_json::to_value(item(None, None)).unwrap();
        assert!(value["properties"]["datetime"].is_null());
        assert!(value.get("bbox").is_none());
        assert_eq!(value["type"], "Feature");
    }
}
