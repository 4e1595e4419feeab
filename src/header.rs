//! Persisting coordinate models as image header keywords.

use std::collections::{BTreeMap, HashMap};

use log::warn;

use crate::error::CorrelateError;
use crate::sky::SkyCoord;
use crate::wcs::{BilinearWcs, CoordinateModel, SimpleWcs};

/// Header keyword naming the model type.
pub const WCSTYPE: &str = "WCSTYPE";

const SIMPLE: &str = "SIMPLE";
const BILINEAR: &str = "BILINEAR";

const SIMPLE_KEYWORDS: [&str; 4] = ["WCSROT", "WCSSCALE", "WCSDECCTR", "WCSRACTR"];

/// Upper left, upper right, lower left, lower right; declination first.
const BILINEAR_KEYWORDS: [&str; 8] = [
    "WCSULDEC", "WCSULRA", "WCSURDEC", "WCSURRA", "WCSLLDEC", "WCSLLRA", "WCSLRDEC", "WCSLRRA",
];

/// String-valued keyword storage, such as a FITS header.
pub trait HeaderStore {
    fn value(&self, keyword: &str) -> Option<&str>;

    fn set_value(&mut self, keyword: &str, value: String);
}

impl HeaderStore for BTreeMap<String, String> {
    fn value(&self, keyword: &str) -> Option<&str> {
        self.get(keyword).map(String::as_str)
    }

    fn set_value(&mut self, keyword: &str, value: String) {
        self.insert(keyword.to_string(), value);
    }
}

impl HeaderStore for HashMap<String, String> {
    fn value(&self, keyword: &str) -> Option<&str> {
        self.get(keyword).map(String::as_str)
    }

    fn set_value(&mut self, keyword: &str, value: String) {
        self.insert(keyword.to_string(), value);
    }
}

fn set_precise<H: HeaderStore + ?Sized>(header: &mut H, keyword: &str, value: f64) {
    header.set_value(keyword, format!("{value:.15}"));
}

/// Read every keyword, warning about each one that is missing or unparsable.
fn read_all<H: HeaderStore + ?Sized, const N: usize>(
    header: &H,
    keywords: [&str; N],
) -> Option<[f64; N]> {
    let mut values = [0.0; N];
    let mut complete = true;
    for (value, keyword) in values.iter_mut().zip(keywords) {
        match header.value(keyword).and_then(|v| v.trim().parse::<f64>().ok()) {
            Some(parsed) => *value = parsed,
            None => {
                warn!("{keyword} keyword missing.");
                complete = false;
            }
        }
    }
    complete.then_some(values)
}

impl CoordinateModel {
    /// Write the model into `header`. Invalid models leave the header untouched.
    pub fn to_header<H: HeaderStore + ?Sized>(&self, header: &mut H) {
        if !self.is_valid() {
            return;
        }
        match self {
            CoordinateModel::Simple(wcs) => {
                header.set_value(WCSTYPE, SIMPLE.to_string());
                let center = wcs.center();
                let values = [wcs.rotation(), wcs.scale(), center.dec, center.ra];
                for (keyword, value) in SIMPLE_KEYWORDS.into_iter().zip(values) {
                    set_precise(header, keyword, value);
                }
            }
            CoordinateModel::Bilinear(wcs) => {
                header.set_value(WCSTYPE, BILINEAR.to_string());
                for (keywords, corner) in BILINEAR_KEYWORDS.chunks(2).zip(wcs.corners()) {
                    set_precise(header, keywords[0], corner.dec);
                    set_precise(header, keywords[1], corner.ra);
                }
            }
        }
    }

    /// Read a model back from `header`.
    ///
    /// Returns `Ok(None)` if no `WCSTYPE` is present. A header with missing
    /// parameters yields a model for which [`is_valid`](CoordinateModel::is_valid)
    /// is false.
    pub fn from_header<H: HeaderStore + ?Sized>(
        header: &H,
        width: f64,
        height: f64,
    ) -> Result<Option<Self>, CorrelateError> {
        let Some(kind) = header.value(WCSTYPE) else {
            return Ok(None);
        };
        let model = match kind.trim() {
            SIMPLE => match read_all(header, SIMPLE_KEYWORDS) {
                Some([rotation, scale, dec, ra]) => CoordinateModel::Simple(SimpleWcs::new(
                    SkyCoord::new(dec, ra),
                    scale,
                    rotation,
                    width,
                    height,
                )),
                None => CoordinateModel::Simple(SimpleWcs::invalid(width, height)),
            },
            BILINEAR => match read_all(header, BILINEAR_KEYWORDS) {
                Some([uld, ulr, urd, urr, lld, llr, lrd, lrr]) => {
                    CoordinateModel::Bilinear(BilinearWcs::from_corners(
                        SkyCoord::new(uld, ulr),
                        SkyCoord::new(urd, urr),
                        SkyCoord::new(lld, llr),
                        SkyCoord::new(lrd, lrr),
                        width,
                        height,
                    ))
                }
                None => CoordinateModel::Bilinear(BilinearWcs::invalid(width, height)),
            },
            other => return Err(CorrelateError::UnknownModelType(other.to_string())),
        };
        Ok(Some(model))
    }
}
