use crate::{
    error::{ControlError, ControlResult},
    types::MappedControl,
};

/// Feature domain shared by every output of the volume mapping, in pixels.
pub const DISTANCE_DOMAIN: (f32, f32) = (50.0, 300.0);
/// Bar top edge in frame pixels; a larger distance moves the bar up.
pub const BAR_RANGE: (f32, f32) = (400.0, 150.0);
pub const PERCENT_RANGE: (f32, f32) = (0.0, 100.0);

/// Clamped linear map from one interval onto another.
///
/// Both intervals are honored in the order given, so a descending `range`
/// produces a non-increasing map. Values outside the domain saturate at the
/// matching end of the range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interpolation {
    domain: (f32, f32),
    range: (f32, f32),
}

impl Interpolation {
    pub fn new(domain: (f32, f32), range: (f32, f32)) -> ControlResult<Self> {
        validate(domain, range)?;
        Ok(Self { domain, range })
    }

    pub fn map(&self, value: f32) -> ControlResult<f32> {
        interpolate(value, self.domain, self.range)
    }
}

fn validate(domain: (f32, f32), range: (f32, f32)) -> ControlResult<()> {
    let finite = [domain.0, domain.1, range.0, range.1]
        .iter()
        .all(|v| v.is_finite());
    if !finite {
        return Err(ControlError::InvalidConfiguration(format!(
            "non-finite bounds in domain {domain:?} / range {range:?}"
        )));
    }
    if domain.0 == domain.1 {
        return Err(ControlError::InvalidConfiguration(format!(
            "domain {domain:?} has zero width"
        )));
    }
    Ok(())
}

/// Maps `value` from `domain` onto `range`, saturating outside the domain.
pub fn interpolate(value: f32, domain: (f32, f32), range: (f32, f32)) -> ControlResult<f32> {
    validate(domain, range)?;
    if value.is_nan() {
        return Err(ControlError::InvalidInput(
            "cannot interpolate NaN".to_string(),
        ));
    }

    let (d0, d1) = domain;
    let (r0, r1) = range;
    let t = (value - d0) / (d1 - d0);
    if t <= 0.0 {
        Ok(r0)
    } else if t >= 1.0 {
        Ok(r1)
    } else {
        Ok(r0 + t * (r1 - r0))
    }
}

/// The three outputs driven by the thumb-index distance.
#[derive(Clone, Copy, Debug)]
pub struct VolumeMapping {
    raw: Interpolation,
    bar: Interpolation,
    percent: Interpolation,
}

impl VolumeMapping {
    /// `volume_range` is the `(min, max)` level reported by the audio endpoint.
    pub fn new(volume_range: (f32, f32)) -> ControlResult<Self> {
        Ok(Self {
            raw: Interpolation::new(DISTANCE_DOMAIN, volume_range)?,
            bar: Interpolation::new(DISTANCE_DOMAIN, BAR_RANGE)?,
            percent: Interpolation::new(DISTANCE_DOMAIN, PERCENT_RANGE)?,
        })
    }

    pub fn map(&self, distance: f32) -> ControlResult<MappedControl> {
        Ok(MappedControl {
            raw_value: self.raw.map(distance)?,
            display_bar: self.bar.map(distance)?,
            display_percent: self.percent.map(distance)?,
        })
    }

    /// What the feedback shows before any volume has been applied.
    pub fn resting(&self) -> MappedControl {
        MappedControl {
            raw_value: self.raw.range.0,
            display_bar: self.bar.range.0,
            display_percent: self.percent.range.0,
        }
    }
}
