use crate::distribution::{mean, sample_std_dev};
use crate::model::{WideRow, WideTable};
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxStats {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub subject: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std_dev: Option<f64>,
    pub boxplot: Option<BoxStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RankingBasis {
    FinalScore,
    OverallMean,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub position: usize,
    pub identifier: i64,
    pub name: String,
    pub score: Option<f64>,
}

/// Closed polygon: the first label/value pair is repeated at the end.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarSeries {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    v
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(&sorted(values), 0.5)
}

// Linear interpolation between closest ranks; `sorted` must be ascending.
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn box_stats(values: &[f64]) -> Option<BoxStats> {
    let s = sorted(values);
    Some(BoxStats {
        min: *s.first()?,
        q1: quantile(&s, 0.25)?,
        median: quantile(&s, 0.5)?,
        q3: quantile(&s, 0.75)?,
        max: *s.last()?,
    })
}

pub fn column_grades(table: &WideTable, col: usize) -> Vec<f64> {
    table.column_values(col).into_iter().map(|(_, v)| v).collect()
}

pub fn subject_summaries(table: &WideTable) -> Vec<SubjectSummary> {
    table
        .subjects()
        .iter()
        .enumerate()
        .map(|(col, subject)| {
            let grades = column_grades(table, col);
            SubjectSummary {
                subject: subject.clone(),
                count: grades.len(),
                mean: mean(&grades),
                median: median(&grades),
                std_dev: sample_std_dev(&grades),
                boxplot: box_stats(&grades),
            }
        })
        .collect()
}

pub fn class_means(table: &WideTable) -> Vec<(String, Option<f64>)> {
    table
        .subjects()
        .iter()
        .enumerate()
        .map(|(col, subject)| (subject.clone(), mean(&column_grades(table, col))))
        .collect()
}

/// Mean over every non-missing grade of the row.
pub fn row_mean(row: &WideRow) -> Option<f64> {
    let grades: Vec<f64> = row.values().flatten().collect();
    mean(&grades)
}

/// Ranks students by the final-score column when the table has one, by their
/// overall mean otherwise. Highest first; students without a score go last.
pub fn ranking(table: &WideTable, final_score_column: Option<&str>) -> (RankingBasis, Vec<RankingEntry>) {
    let final_col = final_score_column.and_then(|name| table.subject_index(name));
    let basis = if final_col.is_some() {
        RankingBasis::FinalScore
    } else {
        RankingBasis::OverallMean
    };

    let mut scored: Vec<(i64, String, Option<f64>)> = table
        .rows()
        .iter()
        .map(|r| {
            let score = match final_col {
                Some(c) => r.cells[c].value(),
                None => row_mean(r),
            };
            (r.student.identifier, r.student.name.clone(), score)
        })
        .collect();

    scored.sort_by(|a, b| match (a.2, b.2) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    let entries = scored
        .into_iter()
        .enumerate()
        .map(|(i, (identifier, name, score))| RankingEntry {
            position: i + 1,
            identifier,
            name,
            score,
        })
        .collect();
    (basis, entries)
}

/// Drops the excluded column and any missing value, then closes the polygon.
pub fn radar_series<I>(pairs: I, exclude: Option<&str>) -> Option<RadarSeries>
where
    I: IntoIterator<Item = (String, Option<f64>)>,
{
    let mut labels = Vec::new();
    let mut values = Vec::new();
    for (label, value) in pairs {
        if exclude == Some(label.as_str()) {
            continue;
        }
        if let Some(v) = value {
            labels.push(label);
            values.push(v);
        }
    }
    let first_label = labels.first()?.clone();
    let first_value = *values.first()?;
    labels.push(first_label);
    values.push(first_value);
    Some(RadarSeries { labels, values })
}

pub fn student_grades(table: &WideTable, row: &WideRow) -> Vec<(String, Option<f64>)> {
    table
        .subjects()
        .iter()
        .cloned()
        .zip(row.values())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GradeFact, StudentRecord, SubjectRecord};
    use crate::pivot::build_wide_table;

    fn table() -> WideTable {
        let students: Vec<StudentRecord> = [(1, "Ana"), (2, "Bruno"), (3, "Carla"), (4, "Davi")]
            .iter()
            .map(|(id, name)| StudentRecord {
                identifier: *id,
                registration_code: None,
                name: name.to_string(),
                email: None,
            })
            .collect();
        let subjects = vec![
            SubjectRecord::new("Math"),
            SubjectRecord::new("Art"),
            SubjectRecord::new("Final score"),
        ];
        let facts = vec![
            GradeFact::new(1, "Math", Some(8.0)),
            GradeFact::new(1, "Art", Some(6.0)),
            GradeFact::new(1, "Final score", Some(7.0)),
            GradeFact::new(2, "Math", Some(4.0)),
            GradeFact::new(2, "Art", None),
            GradeFact::new(2, "Final score", Some(9.5)),
            GradeFact::new(3, "Math", Some(6.0)),
            GradeFact::new(3, "Art", Some(10.0)),
            GradeFact::new(4, "Math", Some(2.0)),
            GradeFact::new(4, "Final score", Some(5.0)),
        ];
        build_wide_table(&students, &subjects, &facts).expect("pivot")
    }

    #[test]
    fn summaries_skip_missing_grades() {
        let s = subject_summaries(&table());
        assert_eq!(s[0].subject, "Math");
        assert_eq!(s[0].count, 4);
        assert_eq!(s[0].mean, Some(5.0));
        assert_eq!(s[0].median, Some(5.0));
        assert_eq!(s[1].count, 2);
        assert_eq!(s[1].mean, Some(8.0));
    }

    #[test]
    fn box_stats_interpolate_linearly() {
        let b = box_stats(&[2.0, 8.0, 4.0, 6.0]).expect("box");
        assert_eq!(b.min, 2.0);
        assert_eq!(b.q1, 3.5);
        assert_eq!(b.median, 5.0);
        assert_eq!(b.q3, 6.5);
        assert_eq!(b.max, 8.0);
        assert_eq!(box_stats(&[]), None);
    }

    #[test]
    fn single_grade_has_no_std_dev() {
        let s = subject_summaries(&table());
        assert!(s[0].std_dev.is_some());
        let lone = sample_std_dev(&[3.0]);
        assert_eq!(lone, None);
    }

    #[test]
    fn ranking_prefers_final_score_column() {
        let (basis, r) = ranking(&table(), Some("Final score"));
        assert_eq!(basis, RankingBasis::FinalScore);
        let names: Vec<&str> = r.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Bruno", "Ana", "Davi", "Carla"]);
        assert_eq!(r[3].score, None);
        assert_eq!(r[0].position, 1);
    }

    #[test]
    fn ranking_falls_back_to_overall_mean() {
        let (basis, r) = ranking(&table(), Some("Nota final"));
        assert_eq!(basis, RankingBasis::OverallMean);
        assert_eq!(r[0].name, "Carla");
        assert_eq!(r[0].score, Some(8.0));
    }

    #[test]
    fn radar_closes_polygon_without_final_score() {
        let t = table();
        let row = t.row(2).expect("row");
        let radar = radar_series(student_grades(&t, row), Some("Final score")).expect("radar");
        assert_eq!(radar.labels, vec!["Math", "Math"]);
        assert_eq!(radar.values, vec![4.0, 4.0]);

        assert_eq!(radar_series(vec![("Art".to_string(), None)], None), None);
    }
}
