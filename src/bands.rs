//! Maps product filenames of one acquisition onto configured band identifiers.
use crate::config::BandConfig;
use std::path::Path;

/// File stem of the last path segment, e.g. `LT05_..._B1` for `a/b/LT05_..._B1.tif`.
pub fn file_stem(key: &str) -> &str {
    Path::new(key)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(key)
}

/// Strips the longest common prefix of all stems from each stem.
///
/// The labels depend on the whole batch: pass every product of an acquisition in one call.
pub fn derive_band_labels<S: AsRef<str>>(filenames: &[S]) -> Vec<String> {
    let stems: Vec<&str> = filenames.iter().map(|f| file_stem(f.as_ref())).collect();
    let prefix_len = common_prefix_len(&stems);
    stems
        .iter()
        .map(|stem| stem[prefix_len..].to_owned())
        .collect()
}

/// Byte length of the longest common prefix, on a char boundary.
fn common_prefix_len(stems: &[&str]) -> usize {
    let Some((first, rest)) = stems.split_first() else {
        return 0;
    };
    let mut len = first.len();
    for stem in rest {
        len = first
            .char_indices()
            .zip(stem.chars())
            .take_while(|((_, a), b)| a == b)
            .last()
            .map_or(0, |((i, a), _)| i + a.len_utf8())
            .min(len);
    }
    len
}

/// A configured band and the product object that carries it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedBand<'a> {
    pub band: &'a BandConfig,
    pub key: String,
}

/// Matches every configured band against the derived labels of `product_keys`.
///
/// Returns the matched bands in configuration order and the names of configured bands that had
/// no product. Labels that aren't configured are ignored.
pub fn match_bands<'a>(
    product_keys: &[String],
    bands: &'a [BandConfig],
) -> (Vec<MatchedBand<'a>>, Vec<&'a str>) {
    let labels = derive_band_labels(product_keys);
    let mut matched = vec![];
    let mut missing = vec![];

    for band in bands {
        let product = labels
            .iter()
            .zip(product_keys)
            .find(|(label, _)| label.as_str() == band.name);
        match product {
            Some((_, key)) => matched.push(MatchedBand {
                band,
                key: key.clone(),
            }),
            None => missing.push(band.name.as_str()),
        }
    }
    (matched, missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::collections::HashMap;

    const SENTINEL_2: [&str; 15] = [
        "S2A_MSIL2A_20151022T222102_T01KBU_B01_60m.tif",
        "S2A_MSIL2A_20151022T222102_T01KBU_B03_10m.tif",
        "S2A_MSIL2A_20151022T222102_T01KBU_SCL_20m.tif",
        "S2A_MSIL2A_20151022T222102_T01KBU_B09_60m.tif",
        "S2A_MSIL2A_20151022T222102_T01KBU_B02_10m.tif",
        "S2A_MSIL2A_20151022T222102_T01KBU_B11_20m.tif",
        "S2A_MSIL2A_20151022T222102_T01KBU_B12_20m.tif",
        "S2A_MSIL2A_20151022T222102_T01KBU_B08_10m.tif",
        "S2A_MSIL2A_20151022T222102_T01KBU_B04_10m.tif",
        "S2A_MSIL2A_20151022T222102_T01KBU_B07_20m.tif",
        "S2A_MSIL2A_20151022T222102_T01KBU_B8A_20m.tif",
        "S2A_MSIL2A_20151022T222102_T01KBU_AOT_10m.tif",
        "S2A_MSIL2A_20151022T222102_T01KBU_B06_20m.tif",
        "S2A_MSIL2A_20151022T222102_T01KBU_WVP_10m.tif",
        "S2A_MSIL2A_20151022T222102_T01KBU_B05_20m.tif",
    ];

    fn band(name: &str, common_name: &str) -> BandConfig {
        BandConfig {
            name: name.to_owned(),
            common_name: Some(common_name.to_owned()),
            extra: Map::new(),
        }
    }

    #[test]
    fn test_derive_band_labels() {
        let labels = derive_band_labels(&SENTINEL_2);
        assert_eq!(
            labels,
            vec![
                "B01_60m", "B03_10m", "SCL_20m", "B09_60m", "B02_10m", "B11_20m", "B12_20m",
                "B08_10m", "B04_10m", "B07_20m", "B8A_20m", "AOT_10m", "B06_20m", "WVP_10m",
                "B05_20m"
            ]
        );
    }

    #[test]
    fn test_derive_band_labels_is_order_independent() {
        let forward: HashMap<&str, String> = SENTINEL_2
            .iter()
            .copied()
            .zip(derive_band_labels(&SENTINEL_2))
            .collect();

        let mut permuted = SENTINEL_2.to_vec();
        permuted.reverse();
        permuted.swap(0, 7);
        let backward: HashMap<&str, String> = permuted
            .iter()
            .copied()
            .zip(derive_band_labels(&permuted))
            .collect();

        assert_eq!(forward, backward);
    }

    #[test]
    fn test_derive_band_labels_strips_directories() {
        let keys = [
            "common_sensing/fiji/landsat_5/LT05_L1TP_075073_19920125/LT05_L1TP_075073_19920125_B1.tif",
            "common_sensing/fiji/landsat_5/LT05_L1TP_075073_19920125/LT05_L1TP_075073_19920125_QA.tif",
        ];
        assert_eq!(derive_band_labels(&keys), vec!["B1", "QA"]);
    }

    #[test]
    fn test_derive_band_labels_depends_on_batch() {
        assert_eq!(derive_band_labels(&["x_B1.tif", "x_B2.tif"]), vec!["1", "2"]);
        assert_eq!(
            derive_band_labels(&["x_B1.tif", "x_B2.tif", "x_QA.tif"]),
            vec!["B1", "B2", "QA"]
        );
        assert_eq!(derive_band_labels(&["only.tif"]), vec![""]);
        assert!(derive_band_labels::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_match_bands() {
        let keys: Vec<String> = ["acq/x_B01_60m.tif", "acq/x_B02_10m.tif", "acq/x_AOT_10m.tif"]
            .iter()
            .map(|k| k.to_string())
            .collect();
        let bands = vec![
            band("B02_10m", "blue"),
            band("B01_60m", "coastal"),
            band("B03_10m", "green"),
        ];

        let (matched, missing) = match_bands(&keys, &bands);
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].band.identifier(), "blue");
        assert_eq!(matched[0].key, "acq/x_B02_10m.tif");
        assert_eq!(matched[1].band.identifier(), "coastal");
        assert_eq!(missing, vec!["B03_10m"]);
    }
}
