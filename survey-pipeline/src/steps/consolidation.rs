//! performance-5: the consolidated, upload-ready workbook.

use std::sync::Arc;

use crate::Result;
use crate::domain::step::{BucketKey, StepId};
use crate::logging::correlator;
use crate::pipeline::step::{StepContext, StepFunction};
use crate::state::store::Bucket;
use crate::steps::clustering::MASTER_SOURCE;
use crate::steps::participation::REGISTRATION_SOURCE;
use crate::steps::{is_grade_source, primary_input};
use crate::utils::filename::{embedded_number, normalize_name};

const SUMMARY_SOURCE: &str = "all_subjects";
const UNNUMBERED_GRADE: u32 = 999;

pub struct Consolidation;

impl StepFunction for Consolidation {
    fn id(&self) -> StepId {
        StepId::Performance(5)
    }

    fn dependencies(&self) -> &'static [BucketKey] {
        &[
            BucketKey::Step(StepId::Performance(4)),
            BucketKey::Step(StepId::Participation),
        ]
    }

    fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let Some(clustered) = primary_input(ctx, StepId::Performance(4).into())? else {
            return Ok(());
        };
        let participation = ctx.input(StepId::Participation)?.clone();
        let out = ctx.output();

        collect_participation(&participation, out);
        collect_summary(&clustered, out);
        collect_grades(&clustered, out);

        correlator::info(format!(
            "Consolidated {} table(s) for upload",
            out.table_count()
        ));
        Ok(())
    }
}

fn collect_participation(participation: &Bucket, out: &mut Bucket) {
    let Some(source) = participation
        .sources()
        .find(|s| s.name().trim().eq_ignore_ascii_case(REGISTRATION_SOURCE))
    else {
        correlator::warn("Participation summary not available; registration sheets skipped");
        return;
    };
    let prefix = normalize_name(source.name());
    for (name, table) in source.tables() {
        let name = normalize_name(name);
        if name == "schl_wise" || name == "grade_wise" {
            out.insert(&prefix, &name, Arc::clone(table));
        }
    }
}

fn collect_summary(clustered: &Bucket, out: &mut Bucket) {
    let Some(master) = clustered.source(MASTER_SOURCE) else {
        correlator::warn("No performance summary found in the clustered data");
        return;
    };
    for (name, table) in master.tables() {
        let name = normalize_name(name);
        if name == "perf_summary" {
            out.insert(SUMMARY_SOURCE, &name, Arc::clone(table));
        }
    }
}

fn collect_grades(clustered: &Bucket, out: &mut Bucket) {
    let mut grades: Vec<_> = clustered
        .sources()
        .filter(|s| is_grade_source(s.name()))
        .collect();
    grades.sort_by_key(|s| embedded_number(s.name()).unwrap_or(UNNUMBERED_GRADE));

    for source in grades {
        let prefix = normalize_name(source.name());
        for (name, table) in source.tables() {
            let name = normalize_name(name);
            if name == "sub_wise_avg_perf" || name.ends_with("_lo") || name.ends_with("_qlvl") {
                out.insert(&prefix, &name, Arc::clone(table));
            }
        }
    }
}
