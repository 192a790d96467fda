// tests/scenarios.rs
//
// Reference scenarios for the monitor and forecaster, driven through the public API.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use news_sentiment_pipeline::config::{ForecastConfig, MonitorConfig};
use news_sentiment_pipeline::{
    aggregate_daily, ArticleRecord, DailyPoint, Forecaster, Monitor, MonitorStatus,
    PipelineError, SentimentLabel,
};

fn record(id: &str, ts: DateTime<Utc>, score: f64) -> ArticleRecord {
    ArticleRecord {
        id: id.to_string(),
        title: format!("headline {id}"),
        url: None,
        published_at: ts,
        sentiment_label: SentimentLabel::from_score(score),
        sentiment_score: score,
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn scenario_a_negative_window_raises_alert() {
    let recs = vec![
        record("r1", Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(), -0.6),
        record("r2", Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap(), -0.5),
    ];
    let monitor = Monitor::new(MonitorConfig {
        critical_threshold: -0.4,
        window_hours: 24,
    });

    let status = monitor.evaluate(&recs);
    let alert = status.alert().expect("window mean is below threshold");
    assert!((alert.mean + 0.55).abs() < 1e-12);
    assert_eq!(alert.threshold, -0.4);
    assert_eq!(alert.record_count, 2);
    assert_eq!(alert.most_negative.id, "r1");
    assert_eq!(alert.most_negative.sentiment_score, -0.6);
    assert_eq!(alert.window.end, recs[1].published_at);
    assert_eq!(alert.window.start, recs[1].published_at - Duration::hours(24));
}

#[test]
fn scenario_b_positive_window_is_ok() {
    let base = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let recs: Vec<_> = (0..6)
        .map(|i| record(&format!("p{i}"), base + Duration::hours(i * 3), 0.2))
        .collect();

    let status = Monitor::new(MonitorConfig::default()).evaluate(&recs);
    match status {
        MonitorStatus::Ok {
            mean, record_count, ..
        } => {
            assert!((mean - 0.2).abs() < 1e-12);
            assert_eq!(record_count, 6);
        }
        other => panic!("expected Ok, got {other:?}"),
    }
}

#[test]
fn scenario_c_two_days_plus_horizon() {
    let series = vec![
        DailyPoint {
            day: day(2024, 1, 1),
            mean_score: -0.3,
            article_count: 4,
        },
        DailyPoint {
            day: day(2024, 1, 2),
            mean_score: -0.1,
            article_count: 3,
        },
    ];
    let forecaster = Forecaster::new(ForecastConfig {
        horizon_days: 5,
        ..Default::default()
    });

    let points = forecaster.forecast(&series).unwrap();
    assert_eq!(points.len(), 7);
    for (i, p) in points.iter().enumerate() {
        assert_eq!(p.day, day(2024, 1, 1) + Duration::days(i as i64));
        assert!(p.lower_bound <= p.predicted && p.predicted <= p.upper_bound);
    }
    // The fit passes through both observations.
    assert!((points[0].predicted + 0.3).abs() < 1e-3);
    assert!((points[1].predicted + 0.1).abs() < 1e-3);
}

#[test]
fn monitor_without_records_reports_no_data() {
    let status = Monitor::new(MonitorConfig::default()).evaluate(&[]);
    assert!(matches!(status, MonitorStatus::NoData { window_hours: 24 }));
    assert!(status.alert().is_none());
}

#[test]
fn single_day_is_insufficient_history() {
    let ts = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let daily = aggregate_daily(&[
        record("a", ts, 0.1),
        record("b", ts + Duration::hours(5), -0.2),
    ]);
    let err = Forecaster::new(ForecastConfig::default())
        .forecast(&daily)
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InsufficientHistory {
            required: 2,
            got: 1
        }
    ));
}

#[test]
fn forecast_of_empty_series_is_insufficient_history() {
    let err = Forecaster::new(ForecastConfig::default())
        .forecast(&[])
        .unwrap_err();
    assert!(matches!(err, PipelineError::InsufficientHistory { got: 0, .. }));
}
