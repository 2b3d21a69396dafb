//! Session-scoped grading entry points.
//!
//! A session is created when a workspace is selected and replaced whenever
//! the catalog changes. Everything it loads from the data source is cached
//! write-once for its lifetime. Source failures are never cached.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::{self, CompositeResult};
use crate::benchmark::{BenchmarkTable, DemographicKey, EndpointTable};
use crate::canon::canonicalize;
use crate::error::{DataUnavailable, GradingError, LookupError, ValidationError};
use crate::format::InputFormat;
use crate::model::TestDefinition;
use crate::source::DataSource;
use crate::strategy::{GradingStrategy, StrategyKind, Tier};
use crate::validate::{validate, validate_with_format_name, CountPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub count_policy: CountPolicy,
    pub single_test_strategy: StrategyKind,
    /// Grade level used for composite grading.
    pub composite_grade: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            count_policy: CountPolicy::Positive,
            single_test_strategy: StrategyKind::Interpolation,
            composite_grade: "12".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
    pub final_score: i64,
    pub tier: Tier,
    pub tier_message: &'static str,
    pub strategy: StrategyKind,
}

#[derive(Default)]
pub struct GradingSession {
    config: SessionConfig,
    tables: HashMap<String, Result<Arc<BenchmarkTable>, LookupError>>,
    endpoints: HashMap<String, Arc<EndpointTable>>,
    definitions: HashMap<String, Option<Arc<TestDefinition>>>,
}

impl GradingSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[cfg(test)]
    pub fn cached_table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn definition(
        &mut self,
        source: &dyn DataSource,
        test_type: &str,
    ) -> Result<Option<Arc<TestDefinition>>, DataUnavailable> {
        if let Some(hit) = self.definitions.get(test_type) {
            return Ok(hit.clone());
        }
        let def = source
            .test_definition(test_type)?
            .as_ref()
            .and_then(TestDefinition::from_record)
            .map(Arc::new);
        self.definitions.insert(test_type.to_string(), def.clone());
        Ok(def)
    }

    /// Threshold table for a test. A missing or malformed table is cached
    /// like a loaded one; a source failure is returned and forgotten.
    pub fn table(
        &mut self,
        source: &dyn DataSource,
        test_type: &str,
    ) -> Result<Arc<BenchmarkTable>, GradingError> {
        if let Some(hit) = self.tables.get(test_type) {
            return hit.clone().map_err(GradingError::from);
        }
        let loaded = match source.benchmark_rows(test_type)? {
            None => Err(LookupError::NoBenchmarkData {
                test_type: test_type.to_string(),
            }),
            Some(records) => BenchmarkTable::from_records(test_type, &records).map(Arc::new),
        };
        match &loaded {
            Ok(t) => debug!(test_type, rows = t.rows().len(), "benchmark table loaded"),
            Err(e) => debug!(test_type, error = %e, "benchmark table unusable"),
        }
        self.tables.insert(test_type.to_string(), loaded.clone());
        loaded.map_err(GradingError::from)
    }

    pub fn endpoint_table(
        &mut self,
        source: &dyn DataSource,
        test_type: &str,
    ) -> Result<Arc<EndpointTable>, DataUnavailable> {
        if let Some(hit) = self.endpoints.get(test_type) {
            return Ok(hit.clone());
        }
        let records = source.endpoint_rows(test_type)?;
        let table = Arc::new(EndpointTable::from_records(test_type, &records));
        self.endpoints.insert(test_type.to_string(), table.clone());
        Ok(table)
    }

    /// Loads every listed table once. Lookup problems are left in the cache
    /// for the caller to meet per test; source failures abort.
    pub fn preload<'t, I>(&mut self, source: &dyn DataSource, test_types: I) -> Result<(), DataUnavailable>
    where
        I: IntoIterator<Item = &'t str>,
    {
        for test_type in test_types {
            if let Err(GradingError::DataUnavailable(e)) = self.table(source, test_type) {
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn validate_input(&self, raw: &str, format: &str) -> Result<InputFormat, ValidationError> {
        validate_with_format_name(raw, format, self.config.count_policy)
    }

    pub fn grade_single_test(
        &mut self,
        source: &dyn DataSource,
        raw: &str,
        test_type: &str,
        grade: &str,
        gender: &str,
        strategy: Option<StrategyKind>,
    ) -> Result<GradingResult, GradingError> {
        let Some(def) = self.definition(source, test_type)? else {
            return Err(LookupError::UnknownTest(test_type.to_string()).into());
        };
        let format = def.format()?;
        validate(raw, format, self.config.count_policy)?;
        let value = canonicalize(raw, format)?;
        let key = DemographicKey::new(gender, grade);
        let kind = strategy.unwrap_or(self.config.single_test_strategy);

        let table: Arc<BenchmarkTable>;
        let strategy = match kind {
            StrategyKind::Interpolation => {
                let endpoints = self.endpoint_table(source, test_type)?;
                GradingStrategy::Interpolation(endpoints.endpoints(&key, format)?)
            }
            StrategyKind::ThresholdScan => {
                table = self.table(source, test_type)?;
                let column = table.resolve_column(&key)?;
                GradingStrategy::ThresholdScan {
                    table: table.as_ref(),
                    column,
                }
            }
        };
        let final_score = strategy.grade(value, format)?;

        let tier = Tier::from_score(final_score);
        info!(
            test_type,
            column = %key.column(),
            strategy = strategy.kind().as_str(),
            final_score,
            "graded single test"
        );
        Ok(GradingResult {
            final_score,
            tier,
            tier_message: tier.message(),
            strategy: strategy.kind(),
        })
    }

    /// Weighted composite for the configured grade unless one is given.
    pub fn grade_composite(
        &mut self,
        source: &dyn DataSource,
        inputs: &HashMap<String, String>,
        gender: &str,
        grade: Option<&str>,
    ) -> Result<CompositeResult, GradingError> {
        let grade = grade
            .map(str::to_string)
            .unwrap_or_else(|| self.config.composite_grade.clone());
        let key = DemographicKey::new(gender, &grade);
        aggregate::grade_composite(self, source, inputs, &key)
    }
}
