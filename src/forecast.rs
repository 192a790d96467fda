//! # Forecaster
//! Additive `trend + seasonality` model over a daily sentiment series.
//!
//! - Trend: linear in time, with time rescaled to `[0, 1]` over the observed span.
//! - Seasonality: Fourier terms (weekly order 3, yearly order 10), phase-aligned to the
//!   calendar so a Monday is always a Monday.
//! - Fit: least squares with a small ridge penalty on the seasonal terms, so short series
//!   fall back to a pure trend instead of over-fitting.
//! - Bounds: residual standard error scaled by the normal quantile of the interval width,
//!   widening with distance past the last observation.

use chrono::{Datelike, Duration, NaiveDate};
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::config::{ForecastConfig, Seasonality, MAX_HORIZON_DAYS};
use crate::error::PipelineError;
use crate::types::{DailyPoint, ForecastPoint};

pub const MIN_HISTORY_DAYS: usize = 2;

const WEEKLY_PERIOD: f64 = 7.0;
const WEEKLY_ORDER: usize = 3;
const YEARLY_PERIOD: f64 = 365.25;
const YEARLY_ORDER: usize = 10;

/// Ridge penalty on trend terms; only there to keep the system positive definite.
const TREND_PENALTY: f64 = 1e-9;
const SEASONAL_PENALTY: f64 = 1e-2;

#[derive(Debug, Clone)]
pub struct Forecaster {
    cfg: ForecastConfig,
}

/// A fitted model that can be evaluated on any day.
#[derive(Debug, Clone)]
pub struct FittedModel {
    origin: NaiveDate,
    span_days: f64,
    seasonality: Seasonality,
    coefficients: Vec<f64>,
    sigma: f64,
    z: f64,
    history: Vec<NaiveDate>,
}

impl Forecaster {
    pub fn new(cfg: ForecastConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.cfg
    }

    /// Fit the model. Points on the same day are merged (count-weighted); non-finite
    /// means are ignored.
    pub fn fit(&self, series: &[DailyPoint]) -> Result<FittedModel, PipelineError> {
        let points = merge_days(series);
        if points.len() < MIN_HISTORY_DAYS {
            return Err(PipelineError::InsufficientHistory {
                required: MIN_HISTORY_DAYS,
                got: points.len(),
            });
        }

        let origin = points[0].0;
        let last = points[points.len() - 1].0;
        let span_days = (last - origin).num_days() as f64;

        let mut model = FittedModel {
            origin,
            span_days,
            seasonality: self.cfg.seasonality,
            coefficients: Vec::new(),
            sigma: 0.0,
            z: interval_z(self.cfg.interval_width),
            history: points.iter().map(|(d, _)| *d).collect(),
        };

        let rows: Vec<Vec<f64>> = points.iter().map(|(d, _)| model.features(*d)).collect();
        let ys: Vec<f64> = points.iter().map(|(_, y)| *y).collect();
        let p = rows[0].len();

        let mut penalty = vec![SEASONAL_PENALTY; p];
        penalty[0] = TREND_PENALTY;
        penalty[1] = TREND_PENALTY;

        model.coefficients = match ridge_solve(&rows, &ys, &penalty) {
            Some(beta) => beta,
            None => {
                tracing::warn!("forecast fit was singular; using the series mean");
                let mean = ys.iter().sum::<f64>() / ys.len() as f64;
                let mut beta = vec![0.0; p];
                beta[0] = mean;
                beta
            }
        };

        let sse: f64 = rows
            .iter()
            .zip(&ys)
            .map(|(x, y)| {
                let r = y - dot(x, &model.coefficients);
                r * r
            })
            .sum();
        let dof = ys.len().saturating_sub(2).max(1) as f64;
        let sigma = (sse / dof).sqrt();
        model.sigma = if sigma.is_finite() { sigma } else { 0.0 };

        tracing::info!(
            days = ys.len(),
            from = %origin,
            to = %last,
            sigma = model.sigma,
            weekly = self.cfg.seasonality.weekly,
            yearly = self.cfg.seasonality.yearly,
            "forecast model fitted"
        );
        Ok(model)
    }

    /// Fit and evaluate over the observed days plus `horizon_days` contiguous future days.
    pub fn forecast(&self, series: &[DailyPoint]) -> Result<Vec<ForecastPoint>, PipelineError> {
        if self.cfg.horizon_days > MAX_HORIZON_DAYS {
            return Err(PipelineError::HorizonTooLong {
                max: MAX_HORIZON_DAYS,
                got: self.cfg.horizon_days,
            });
        }
        let model = self.fit(series)?;
        Ok(model.project(self.cfg.horizon_days))
    }
}

impl FittedModel {
    fn features(&self, day: NaiveDate) -> Vec<f64> {
        let t = (day - self.origin).num_days() as f64 / self.span_days.max(1.0);
        // Absolute day number keeps the seasonal phase tied to the calendar.
        let abs_day = day.num_days_from_ce() as f64;

        let mut x = vec![1.0, t];
        if self.seasonality.weekly {
            push_fourier(&mut x, abs_day, WEEKLY_PERIOD, WEEKLY_ORDER);
        }
        if self.seasonality.yearly {
            push_fourier(&mut x, abs_day, YEARLY_PERIOD, YEARLY_ORDER);
        }
        x
    }

    pub fn predict(&self, day: NaiveDate) -> f64 {
        dot(&self.features(day), &self.coefficients)
    }

    pub fn residual_sigma(&self) -> f64 {
        self.sigma
    }

    pub fn last_observed(&self) -> NaiveDate {
        self.history[self.history.len() - 1]
    }

    /// Point forecast with interval. Width grows with the number of days past the history.
    pub fn point(&self, day: NaiveDate) -> ForecastPoint {
        let predicted = self.predict(day);
        let ahead = (day - self.last_observed()).num_days().max(0) as f64;
        let n = self.history.len() as f64;
        let half = self.z * self.sigma * (1.0 + ahead / n).sqrt();
        ForecastPoint {
            day,
            predicted,
            lower_bound: predicted - half,
            upper_bound: predicted + half,
        }
    }

    /// Observed days followed by `horizon` consecutive days after the last one.
    pub fn project(&self, horizon: usize) -> Vec<ForecastPoint> {
        let last = self.last_observed();
        let mut out: Vec<ForecastPoint> = self.history.iter().map(|d| self.point(*d)).collect();
        out.extend((1..=horizon as i64).map(|i| self.point(last + Duration::days(i))));
        out
    }
}

/// Collapse the series to one value per day, ascending.
fn merge_days(series: &[DailyPoint]) -> Vec<(NaiveDate, f64)> {
    let mut acc: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for p in series {
        if !p.mean_score.is_finite() {
            tracing::debug!(day = %p.day, "skipping non-finite daily mean");
            continue;
        }
        let w = p.article_count.max(1) as f64;
        let e = acc.entry(p.day).or_insert((0.0, 0.0));
        e.0 += p.mean_score * w;
        e.1 += w;
    }
    acc.into_iter().map(|(d, (s, w))| (d, s / w)).collect()
}

fn push_fourier(x: &mut Vec<f64>, abs_day: f64, period: f64, order: usize) {
    for k in 1..=order {
        let a = 2.0 * PI * k as f64 * abs_day / period;
        x.push(a.sin());
        x.push(a.cos());
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Solve `(XᵀX + diag(penalty)) β = Xᵀy` by Cholesky decomposition.
fn ridge_solve(rows: &[Vec<f64>], ys: &[f64], penalty: &[f64]) -> Option<Vec<f64>> {
    let p = penalty.len();
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    let x = DMatrix::from_row_slice(rows.len(), p, &flat);
    let y = DVector::from_column_slice(ys);

    let xt = x.transpose();
    let a = &xt * &x + DMatrix::from_diagonal(&DVector::from_column_slice(penalty));
    let b = &xt * y;

    let beta = a.cholesky()?.solve(&b);
    beta.iter()
        .all(|v| v.is_finite())
        .then(|| beta.iter().copied().collect())
}

/// Two-sided standard normal quantile for an interval holding `width` of the mass.
fn interval_z(width: f64) -> f64 {
    let upper = (0.5 + width / 2.0).clamp(0.5, 1.0 - 1e-12);
    match Normal::new(0.0, 1.0) {
        Ok(n) => n.inverse_cdf(upper),
        Err(e) => {
            tracing::warn!(error = %e, "standard normal unavailable; intervals collapse");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pt(d: NaiveDate, y: f64) -> DailyPoint {
        DailyPoint {
            day: d,
            mean_score: y,
            article_count: 1,
        }
    }

    #[test]
    fn quantile_matches_known_values() {
        assert!((interval_z(0.8) - 1.2816).abs() < 1e-3);
        assert!((interval_z(0.95) - 1.96).abs() < 1e-3);
        assert!(interval_z(0.0).abs() < 1e-6);
    }

    #[test]
    fn oversized_horizon_is_an_error() {
        let f = Forecaster::new(ForecastConfig {
            horizon_days: usize::MAX / 2,
            ..Default::default()
        });
        let series = [pt(day(2024, 1, 1), 0.1), pt(day(2024, 1, 2), 0.2)];
        assert!(matches!(
            f.forecast(&series),
            Err(PipelineError::HorizonTooLong { max: MAX_HORIZON_DAYS, .. })
        ));

        let f = Forecaster::new(ForecastConfig {
            horizon_days: MAX_HORIZON_DAYS,
            ..Default::default()
        });
        assert_eq!(f.forecast(&series).unwrap().len(), 2 + MAX_HORIZON_DAYS);
    }

    #[test]
    fn fewer_than_two_days_is_insufficient() {
        let f = Forecaster::new(ForecastConfig::default());
        assert!(matches!(
            f.forecast(&[]),
            Err(PipelineError::InsufficientHistory { got: 0, .. })
        ));
        let one = pt(day(2024, 1, 1), 0.1);
        assert!(matches!(
            f.forecast(&[one]),
            Err(PipelineError::InsufficientHistory { got: 1, .. })
        ));
        // Same day twice is still one distinct day.
        assert!(matches!(
            f.forecast(&[one, pt(day(2024, 1, 1), 0.3)]),
            Err(PipelineError::InsufficientHistory { got: 1, .. })
        ));
    }

    #[test]
    fn two_points_give_an_exact_line() {
        let f = Forecaster::new(ForecastConfig::default());
        let series = [pt(day(2024, 1, 1), -0.3), pt(day(2024, 1, 2), -0.1)];
        let m = f.fit(&series).unwrap();
        assert!((m.predict(day(2024, 1, 1)) + 0.3).abs() < 1e-4);
        assert!((m.predict(day(2024, 1, 2)) + 0.1).abs() < 1e-4);
        assert!(m.residual_sigma() < 1e-4);
    }

    #[test]
    fn linear_trend_extrapolates() {
        let cfg = ForecastConfig {
            seasonality: Seasonality {
                weekly: false,
                yearly: false,
            },
            ..Default::default()
        };
        let f = Forecaster::new(cfg);
        let series: Vec<_> = (0..10)
            .map(|i| pt(day(2024, 3, 1) + Duration::days(i), 0.05 * i as f64 - 0.2))
            .collect();
        let m = f.fit(&series).unwrap();
        let want = 0.05 * 14.0 - 0.2;
        assert!((m.predict(day(2024, 3, 15)) - want).abs() < 1e-6);
    }

    #[test]
    fn weekly_pattern_is_recovered() {
        let f = Forecaster::new(ForecastConfig::default());
        // Four weeks of a flat series that dips every Monday.
        let start = day(2024, 1, 1); // a Monday
        let series: Vec<_> = (0..28)
            .map(|i| {
                let d = start + Duration::days(i);
                pt(d, if i % 7 == 0 { -0.5 } else { 0.1 })
            })
            .collect();
        let m = f.fit(&series).unwrap();
        let next_monday = day(2024, 1, 29);
        let next_tuesday = day(2024, 1, 30);
        assert!(m.predict(next_monday) < m.predict(next_tuesday) - 0.3);
    }

    #[test]
    fn projection_covers_history_then_contiguous_horizon() {
        let cfg = ForecastConfig {
            horizon_days: 4,
            ..Default::default()
        };
        let f = Forecaster::new(cfg);
        let series = [
            pt(day(2024, 1, 1), 0.0),
            pt(day(2024, 1, 5), 0.2),
            pt(day(2024, 1, 3), 0.1),
        ];
        let out = f.forecast(&series).unwrap();
        let days: Vec<_> = out.iter().map(|p| p.day).collect();
        assert_eq!(
            days,
            vec![
                day(2024, 1, 1),
                day(2024, 1, 3),
                day(2024, 1, 5),
                day(2024, 1, 6),
                day(2024, 1, 7),
                day(2024, 1, 8),
                day(2024, 1, 9),
            ]
        );
    }

    #[test]
    fn intervals_widen_into_the_future() {
        let f = Forecaster::new(ForecastConfig::default());
        let series: Vec<_> = (0..14)
            .map(|i| {
                let wobble = if i % 3 == 0 { 0.2 } else { -0.1 };
                pt(day(2024, 5, 1) + Duration::days(i), wobble)
            })
            .collect();
        let out = f.forecast(&series).unwrap();
        let width = |p: &ForecastPoint| p.upper_bound - p.lower_bound;
        let last_hist = &out[13];
        let far = out.last().unwrap();
        assert!(width(far) > width(last_hist));
        assert!(out
            .iter()
            .all(|p| p.lower_bound <= p.predicted && p.predicted <= p.upper_bound));
    }
}
