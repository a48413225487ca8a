//! Metadata extraction: acquisition dates from filenames, footprints and pixel grids from
//! GeoTIFF headers, and footprint reprojection.
use crate::document::Geometry;
use crate::error::{Result, SyncError};
use crate::s3::ObjectStore;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::fmt;
use std::io::Cursor;
use tiff::decoder::Decoder;
use tiff::tags::Tag;
use tracing::{debug, warn};
use url::Url;

// GeoKey ids
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const USER_DEFINED: u16 = 32767;

/// Returns the date found in the last path segment of `filename`.
///
/// The first capture group of `regex` is parsed with the strftime-style `format`; patterns
/// without groups use the whole match. Formats without a time component parse to midnight UTC.
pub fn extract_date(filename: &str, regex: &str, format: &str) -> Option<DateTime<Utc>> {
    let name = filename
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(filename);

    let re = match Regex::new(regex) {
        Ok(re) => re,
        Err(e) => {
            warn!(regex, error = %e, "Invalid date pattern");
            return None;
        }
    };

    let captures = re.captures(name)?;
    let matched = captures.get(1).or_else(|| captures.get(0))?.as_str();
    parse_datetime(matched, format)
}

fn parse_datetime(value: &str, format: &str) -> Option<DateTime<Utc>> {
    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, format) {
        return Some(Utc.from_utc_datetime(&datetime));
    }
    match NaiveDate::parse_from_str(value, format) {
        Ok(date) => date
            .and_hms_opt(0, 0, 0)
            .map(|datetime| Utc.from_utc_datetime(&datetime)),
        Err(e) => {
            warn!(value, format, error = %e, "Unable to parse date");
            None
        }
    }
}

/// Coordinate reference system identified by its EPSG code. The empty CRS stands for "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Crs {
    epsg: Option<u16>,
}

impl Crs {
    pub fn from_epsg(epsg: u16) -> Self {
        Self { epsg: Some(epsg) }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn epsg(&self) -> Option<u16> {
        self.epsg
    }

    pub fn is_valid(&self) -> bool {
        self.epsg.is_some()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.epsg {
            Some(code) => write!(f, "EPSG:{code}"),
            None => write!(f, "<empty>"),
        }
    }
}

/// Single-ring polygon. An empty polygon has no vertices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon {
    pub exterior: Vec<[f64; 2]>,
}

impl Polygon {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rectangle over `[minx, miny, maxx, maxy]`, starting at the lower right corner and
    /// running counter-clockwise.
    pub fn from_bounds(bounds: [f64; 4]) -> Self {
        let [minx, miny, maxx, maxy] = bounds;
        Self {
            exterior: vec![
                [maxx, miny],
                [maxx, maxy],
                [minx, maxy],
                [minx, miny],
                [maxx, miny],
            ],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exterior.is_empty()
    }

    pub fn bounds(&self) -> Option<[f64; 4]> {
        let first = self.exterior.first()?;
        let init = [first[0], first[1], first[0], first[1]];
        Some(self.exterior.iter().fold(init, |b, &[x, y]| {
            [b[0].min(x), b[1].min(y), b[2].max(x), b[3].max(y)]
        }))
    }

    pub fn to_geometry(&self) -> Geometry {
        let coordinates = if self.is_empty() {
            vec![]
        } else {
            vec![self.exterior.clone()]
        };
        Geometry {
            r#type: "Polygon".to_owned(),
            coordinates,
        }
    }
}

/// Georeferencing read from a GeoTIFF header.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterHeader {
    pub width: u32,
    pub height: u32,
    /// Affine `[a, b, c, d, e, f]` with `x = a*col + b*row + c` and `y = d*col + e*row + f`.
    pub transform: [f64; 6],
    pub epsg: Option<u16>,
}

impl RasterHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut decoder = Decoder::new(Cursor::new(data)).map_err(unreadable)?;
        let (width, height) = decoder.dimensions().map_err(unreadable)?;

        let transform = match decoder
            .find_tag(Tag::ModelTransformationTag)
            .map_err(unreadable)?
        {
            Some(value) => {
                let m = value.into_f64_vec().map_err(unreadable)?;
                if m.len() < 8 {
                    return Err(unreadable("ModelTransformation tag is too short"));
                }
                [m[0], m[1], m[3], m[4], m[5], m[7]]
            }
            None => {
                let scale = decoder
                    .find_tag(Tag::ModelPixelScaleTag)
                    .map_err(unreadable)?
                    .ok_or_else(|| unreadable("missing ModelPixelScale tag"))?
                    .into_f64_vec()
                    .map_err(unreadable)?;
                let tiepoint = decoder
                    .find_tag(Tag::ModelTiepointTag)
                    .map_err(unreadable)?
                    .ok_or_else(|| unreadable("missing ModelTiepoint tag"))?
                    .into_f64_vec()
                    .map_err(unreadable)?;
                if scale.len() < 2 || tiepoint.len() < 6 {
                    return Err(unreadable("ModelPixelScale or ModelTiepoint tag is too short"));
                }
                // Tiepoint (i, j, k, x, y, z) maps pixel (i, j) to world (x, y)
                [
                    scale[0],
                    0.0,
                    tiepoint[3] - tiepoint[0] * scale[0],
                    0.0,
                    -scale[1],
                    tiepoint[4] + tiepoint[1] * scale[1],
                ]
            }
        };

        let epsg = match decoder
            .find_tag(Tag::GeoKeyDirectoryTag)
            .map_err(unreadable)?
        {
            Some(value) => epsg_from_geokeys(&value.into_u16_vec().map_err(unreadable)?),
            None => None,
        };

        Ok(Self {
            width,
            height,
            transform,
            epsg,
        })
    }

    /// `[minx, miny, maxx, maxy]` over the four image corners in the native CRS.
    pub fn bounds(&self) -> [f64; 4] {
        let (w, h) = (self.width as f64, self.height as f64);
        let corners =
            [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)].map(|(col, row)| self.apply(col, row));
        corners.iter().skip(1).fold(
            [corners[0].0, corners[0].1, corners[0].0, corners[0].1],
            |b, &(x, y)| [b[0].min(x), b[1].min(y), b[2].max(x), b[3].max(y)],
        )
    }

    /// `[rows, cols]`
    pub fn shape(&self) -> Vec<u32> {
        vec![self.height, self.width]
    }

    /// Full 3x3 affine matrix, row-major.
    pub fn affine(&self) -> Vec<f64> {
        let mut affine = self.transform.to_vec();
        affine.extend([0.0, 0.0, 1.0]);
        affine
    }

    pub fn crs(&self) -> Crs {
        Crs { epsg: self.epsg }
    }

    fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.transform;
        (a * col + b * row + c, d * col + e * row + f)
    }
}

/// GeoKeyDirectory layout: `[version, revision, minor, count, (key, location, count, value)*]`.
/// Projected CRS codes take precedence over geographic ones.
fn epsg_from_geokeys(keys: &[u16]) -> Option<u16> {
    let count = *keys.get(3)? as usize;
    let mut geographic = None;
    let mut projected = None;
    for entry in keys[4..].chunks_exact(4).take(count) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == USER_DEFINED {
            continue;
        }
        match key {
            PROJECTED_CS_TYPE_GEO_KEY => projected = Some(value),
            GEOGRAPHIC_TYPE_GEO_KEY => geographic = Some(value),
            _ => {}
        }
    }
    projected.or(geographic)
}

fn unreadable(reason: impl fmt::Display) -> SyncError {
    SyncError::RasterUnreadable {
        reason: reason.to_string(),
    }
}

/// Where a raster header is read from.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterSource {
    Url(Url),
    Object { bucket: String, key: String },
    Bytes(Vec<u8>),
}

impl fmt::Display for RasterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::Object { bucket, key } => write!(f, "s3://{bucket}/{key}"),
            Self::Bytes(data) => write!(f, "<{} bytes>", data.len()),
        }
    }
}

/// Reads raster headers through an injected object store (or over http for urls), fetching only
/// the first `header_bytes` bytes of each raster.
pub struct RasterReader<'a, S> {
    store: &'a S,
    header_bytes: u64,
    http: reqwest::Client,
}

impl<'a, S: ObjectStore> RasterReader<'a, S> {
    pub fn new(store: &'a S, header_bytes: u64) -> Self {
        Self {
            store,
            header_bytes: header_bytes.max(1),
            http: reqwest::Client::new(),
        }
    }

    /// Parses the header from the first `header_bytes` bytes. Rasters whose IFD lies beyond that
    /// range (pixel data written before the directory) are read again in full.
    pub async fn read_header(&self, source: &RasterSource) -> Result<RasterHeader> {
        match source {
            RasterSource::Bytes(data) => RasterHeader::parse(data),
            RasterSource::Object { bucket, key } => {
                let data = self
                    .store
                    .get_object_range(bucket, key, 0, self.header_bytes - 1)
                    .await?;
                match RasterHeader::parse(&data) {
                    Err(e) if self.is_truncated(&data) => {
                        debug!(%source, error = %e, "Header not in leading range, reading object");
                        let data = self.store.get_object(bucket, key).await?;
                        RasterHeader::parse(&data)
                    }
                    parsed => parsed,
                }
            }
            RasterSource::Url(url) => {
                let data = self.fetch_url(url, true).await?;
                match RasterHeader::parse(&data) {
                    Err(e) if self.is_truncated(&data) => {
                        debug!(%source, error = %e, "Header not in leading range, reading url");
                        let data = self.fetch_url(url, false).await?;
                        RasterHeader::parse(&data)
                    }
                    parsed => parsed,
                }
            }
        }
    }

    fn is_truncated(&self, data: &[u8]) -> bool {
        data.len() as u64 >= self.header_bytes
    }

    async fn fetch_url(&self, url: &Url, leading_range: bool) -> anyhow::Result<Vec<u8>> {
        let mut request = self.http.get(url.clone());
        if leading_range {
            request = request.header(
                reqwest::header::RANGE,
                format!("bytes=0-{}", self.header_bytes - 1),
            );
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Error requesting {url}"))?
            .error_for_status()?;
        let data = response.bytes().await?;
        Ok(data.to_vec())
    }

    /// Footprint and native CRS of the raster. Unreadable rasters yield an empty polygon and an
    /// empty CRS.
    pub async fn extract_footprint(&self, source: &RasterSource) -> (Polygon, Crs) {
        match self.read_header(source).await {
            Ok(header) => (Polygon::from_bounds(header.bounds()), header.crs()),
            Err(e) => {
                warn!(%source, error = %e, "Error extracting geometry");
                (Polygon::empty(), Crs::empty())
            }
        }
    }

    /// Pixel shape and affine transform of the raster; empty on failure.
    pub async fn extract_grid(&self, source: &RasterSource) -> (Vec<u32>, Vec<f64>) {
        match self.read_header(source).await {
            Ok(header) => (header.shape(), header.affine()),
            Err(e) => {
                warn!(%source, error = %e, "Error extracting projection");
                (vec![], vec![])
            }
        }
    }
}

/// Reprojects every vertex of `polygon` from `crs` into `target_epsg`.
///
/// An empty polygon stays empty. A non-empty polygon without a CRS cannot be placed and is an
/// error, as is any projection failure.
pub fn reproject(polygon: &Polygon, crs: Crs, target_epsg: u16) -> Result<Polygon> {
    if polygon.is_empty() {
        return Ok(Polygon::empty());
    }
    let source_epsg = crs.epsg().ok_or_else(|| SyncError::Reprojection {
        reason: "footprint has no CRS".to_owned(),
    })?;
    if source_epsg == target_epsg {
        return Ok(polygon.clone());
    }

    let exterior = polygon
        .exterior
        .iter()
        .map(|&[x, y]| {
            project_point(source_epsg, target_epsg, x, y)
                .map(|(x, y)| [x, y])
                .map_err(|reason| SyncError::Reprojection { reason })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Polygon { exterior })
}

fn get_proj_string(epsg: u16) -> Option<&'static str> {
    crs_definitions::from_code(epsg).map(|def| def.proj4)
}

fn is_geographic(proj_string: &str) -> bool {
    proj_string.contains("+proj=longlat")
}

fn project_point(
    source_epsg: u16,
    target_epsg: u16,
    x: f64,
    y: f64,
) -> std::result::Result<(f64, f64), String> {
    use proj4rs::proj::Proj;
    use proj4rs::transform::transform;

    let source_str = get_proj_string(source_epsg)
        .ok_or_else(|| format!("EPSG:{source_epsg} is not in the crs-definitions database"))?;
    let target_str = get_proj_string(target_epsg)
        .ok_or_else(|| format!("EPSG:{target_epsg} is not in the crs-definitions database"))?;

    let source_proj = Proj::from_proj_string(source_str)
        .map_err(|e| format!("Invalid source projection EPSG:{source_epsg}: {e:?}"))?;
    let target_proj = Proj::from_proj_string(target_str)
        .map_err(|e| format!("Invalid target projection EPSG:{target_epsg}: {e:?}"))?;

    // proj4rs works in radians for geographic coordinates
    let mut point = if is_geographic(source_str) {
        (x.to_radians(), y.to_radians(), 0.0)
    } else {
        (x, y, 0.0)
    };
    transform(&source_proj, &target_proj, &mut point).map_err(|e| {
        format!("Transform from EPSG:{source_epsg} to EPSG:{target_epsg} failed: {e:?}")
    })?;

    if is_geographic(target_str) {
        Ok((point.0.to_degrees(), point.1.to_degrees()))
    } else {
        Ok((point.0, point.1))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Cursor;
    use tiff::encoder::{colortype, TiffEncoder};
    use tiff::tags::Tag;

    /// Single band north-up GeoTIFF with its upper left corner at `origin`.
    pub(crate) fn geotiff(
        width: u32,
        height: u32,
        origin: (f64, f64),
        pixel_size: f64,
        epsg: u16,
    ) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut cursor).unwrap();
            let mut image = encoder
                .new_image::<colortype::Gray8>(width, height)
                .unwrap();

            let pixel_scale = [pixel_size, pixel_size, 0.0];
            image
                .encoder()
                .write_tag(Tag::ModelPixelScaleTag, pixel_scale.as_slice())
                .unwrap();
            let tiepoint = [0.0, 0.0, 0.0, origin.0, origin.1, 0.0];
            image
                .encoder()
                .write_tag(Tag::ModelTiepointTag, tiepoint.as_slice())
                .unwrap();
            let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, epsg];
            image
                .encoder()
                .write_tag(Tag::GeoKeyDirectoryTag, geokeys.as_slice())
                .unwrap();

            let pixels = vec![0u8; (width * height) as usize];
            image.write_data(&pixels).unwrap();
        }
        cursor.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::geotiff;
    use super::*;
    use crate::in_memory::InMemoryStore;

    #[test]
    fn test_extract_date_from_filename() {
        let date = extract_date(
            "tests/data/sentinel_2/S2A_MSIL2A_20151022T222102_T01KBU/S2A_MSIL2A_20151022T222102_T01KBU_B01_60m.tif",
            r"(\d{8}T\d{6})",
            "%Y%m%dT%H%M%S",
        );
        assert_eq!(date, Some(Utc.with_ymd_and_hms(2015, 10, 22, 22, 21, 2).unwrap()));
    }

    #[test]
    fn test_extract_date_from_http_url() {
        let date = extract_date(
            "http://s3-uk-1.sa-catapult.co.uk/public-eo-data/common_sensing/fiji/sentinel_2/\
             S2A_MSIL2A_20151022T222102_T01KBU/S2A_MSIL2A_20151022T222102_T01KBU_B01_60m.tif",
            r"(\d{8}T\d{6})",
            "%Y%m%dT%H%M%S",
        );
        assert_eq!(date, Some(Utc.with_ymd_and_hms(2015, 10, 22, 22, 21, 2).unwrap()));
    }

    #[test]
    fn test_extract_date_uses_last_segment_of_prefix() {
        let date = extract_date(
            "common_sensing/fiji/landsat_5/LT05_L1TP_075073_19920125/",
            r"_(\d{8})",
            "%Y%m%d",
        );
        assert_eq!(date, Some(Utc.with_ymd_and_hms(1992, 1, 25, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_extract_date_first_group_of_many() {
        let date = extract_date("S2A_20151022_T01KBU_20200101", r"(\d{8})_(T\w+)", "%Y%m%d");
        assert_eq!(date, Some(Utc.with_ymd_and_hms(2015, 10, 22, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_extract_date_without_groups_uses_whole_match() {
        let date = extract_date("LT05_19920125.tif", r"\d{8}", "%Y%m%d");
        assert_eq!(date, Some(Utc.with_ymd_and_hms(1992, 1, 25, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_extract_date_no_match() {
        assert_eq!(extract_date("no_date_here.tif", r"(\d{8})", "%Y%m%d"), None);
        assert_eq!(extract_date("LT05_99999999.tif", r"(\d{8})", "%Y%m%d"), None);
        assert_eq!(extract_date("LT05_19920125.tif", r"(\d{8", "%Y%m%d"), None);
    }

    #[test]
    fn test_parse_header() {
        let data = geotiff(100, 50, (199980.0, 7900000.0), 60.0, 32701);
        let header = RasterHeader::parse(&data).unwrap();
        assert_eq!(header.width, 100);
        assert_eq!(header.height, 50);
        assert_eq!(header.epsg, Some(32701));
        assert_eq!(header.bounds(), [199980.0, 7897000.0, 205980.0, 7900000.0]);
        assert_eq!(header.shape(), vec![50, 100]);
        assert_eq!(
            header.affine(),
            vec![60.0, 0.0, 199980.0, 0.0, -60.0, 7900000.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_parse_garbage_is_unreadable() {
        let err = RasterHeader::parse(b"definitely not a tiff").unwrap_err();
        assert!(matches!(err, SyncError::RasterUnreadable { .. }));
    }

    #[test]
    fn test_epsg_from_geokeys() {
        assert_eq!(epsg_from_geokeys(&[1, 1, 0, 1, 2048, 0, 1, 4326]), Some(4326));
        assert_eq!(
            epsg_from_geokeys(&[1, 1, 0, 2, 2048, 0, 1, 4326, 3072, 0, 1, 32760]),
            Some(32760)
        );
        assert_eq!(epsg_from_geokeys(&[1, 1, 0, 1, 3072, 0, 1, USER_DEFINED]), None);
        assert_eq!(epsg_from_geokeys(&[1, 1]), None);
    }

    #[test]
    fn test_polygon_from_bounds() {
        let polygon = Polygon::from_bounds([199980.0, 7790200.0, 309780.0, 7900000.0]);
        assert_eq!(
            polygon.exterior,
            vec![
                [309780.0, 7790200.0],
                [309780.0, 7900000.0],
                [199980.0, 7900000.0],
                [199980.0, 7790200.0],
                [309780.0, 7790200.0],
            ]
        );
        assert_eq!(polygon.bounds(), Some([199980.0, 7790200.0, 309780.0, 7900000.0]));
        assert_eq!(Polygon::empty().bounds(), None);
        assert!(Polygon::empty().to_geometry().coordinates.is_empty());
    }

    #[tokio::test]
    async fn test_extract_footprint_from_object() {
        let store = InMemoryStore::new();
        store.insert(
            "bucket",
            "a/b.tif",
            geotiff(183, 183, (199980.0, 7900000.0), 600.0, 32701),
        );
        let reader = RasterReader::new(&store, 1 << 20);
        let source = RasterSource::Object {
            bucket: "bucket".to_owned(),
            key: "a/b.tif".to_owned(),
        };

        let (polygon, crs) = reader.extract_footprint(&source).await;
        assert_eq!(crs, Crs::from_epsg(32701));
        assert_eq!(
            polygon,
            Polygon::from_bounds([199980.0, 7790200.0, 309780.0, 7900000.0])
        );
    }

    #[tokio::test]
    async fn test_extract_footprint_with_directory_after_pixels() {
        let store = InMemoryStore::new();
        let data = geotiff(1200, 1200, (500000.0, 8000000.0), 30.0, 32760);
        assert!(data.len() > 1 << 20);
        store.insert("bucket", "large.tif", data);
        store.insert(
            "bucket",
            "small.tif",
            geotiff(20, 20, (500000.0, 8000000.0), 30.0, 32760),
        );
        let reader = RasterReader::new(&store, 1 << 20);
        let (polygon, crs) = reader
            .extract_footprint(&RasterSource::Object {
                bucket: "bucket".to_owned(),
                key: "large.tif".to_owned(),
            })
            .await;
        assert_eq!(crs, Crs::from_epsg(32760));
        assert_eq!(
            polygon.bounds(),
            Some([500000.0, 7964000.0, 536000.0, 8000000.0])
        );

        let reader = RasterReader::new(&store, 64);
        let (shape, _) = reader
            .extract_grid(&RasterSource::Object {
                bucket: "bucket".to_owned(),
                key: "small.tif".to_owned(),
            })
            .await;
        assert_eq!(shape, vec![20, 20]);
    }

    #[tokio::test]
    async fn test_extract_footprint_unreadable_degrades() {
        let store = InMemoryStore::new();
        let reader = RasterReader::new(&store, 1 << 20);

        let missing = RasterSource::Object {
            bucket: "bucket".to_owned(),
            key: "missing.tif".to_owned(),
        };
        assert_eq!(
            reader.extract_footprint(&missing).await,
            (Polygon::empty(), Crs::empty())
        );

        let garbage = RasterSource::Bytes(b"not a raster".to_vec());
        let (polygon, crs) = reader.extract_footprint(&garbage).await;
        assert!(polygon.is_empty());
        assert!(!crs.is_valid());

        let unreachable = RasterSource::Url(Url::parse("http://127.0.0.1:9/raster.tif").unwrap());
        assert_eq!(
            reader.extract_footprint(&unreachable).await,
            (Polygon::empty(), Crs::empty())
        );
    }

    #[tokio::test]
    async fn test_extract_grid() {
        let store = InMemoryStore::new();
        let reader = RasterReader::new(&store, 1 << 20);
        let source = RasterSource::Bytes(geotiff(20, 10, (500000.0, 100.0), 30.0, 32760));

        let (shape, transform) = reader.extract_grid(&source).await;
        assert_eq!(shape, vec![10, 20]);
        assert_eq!(transform[0], 30.0);
        assert_eq!(transform[2], 500000.0);
        assert_eq!(transform[4], -30.0);

        let (shape, transform) = reader
            .extract_grid(&RasterSource::Bytes(vec![0u8; 16]))
            .await;
        assert!(shape.is_empty());
        assert!(transform.is_empty());
    }

    #[test]
    fn test_reproject_utm_to_geographic() {
        let polygon = Polygon::from_bounds([199980.0, 7790200.0, 309780.0, 7900000.0]);
        let reprojected = reproject(&polygon, Crs::from_epsg(32701), 4326).unwrap();
        assert_eq!(reprojected.exterior.len(), 5);
        for &[lon, lat] in &reprojected.exterior {
            assert!((-180.5..-177.0).contains(&lon), "lon {lon}");
            assert!((-21.0..-18.5).contains(&lat), "lat {lat}");
        }
    }

    #[test]
    fn test_reproject_same_crs_and_empty() {
        let polygon = Polygon::from_bounds([1.0, 2.0, 3.0, 4.0]);
        assert_eq!(reproject(&polygon, Crs::from_epsg(4326), 4326).unwrap(), polygon);
        assert_eq!(
            reproject(&Polygon::empty(), Crs::empty(), 4326).unwrap(),
            Polygon::empty()
        );
    }

    #[test]
    fn test_reproject_without_crs_fails() {
        let polygon = Polygon::from_bounds([1.0, 2.0, 3.0, 4.0]);
        let err = reproject(&polygon, Crs::empty(), 4326).unwrap_err();
        assert!(matches!(err, SyncError::Reprojection { .. }));
    }
}
