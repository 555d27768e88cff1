//! Shared fixtures for Tally Core integration tests: a small Northwind-shaped
//! SQLite database and a markdown corpus, both written to a temp directory.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::Connection;
use tally_abstraction::LanguageModel;
use tally_core::pipeline::{Pipeline, PipelineSettings};
use tally_core::retrieval::{load_corpus, Retriever};
use tally_core::storage::{RelationalStore, SchemaMetadata, SqliteStore};
use tally_training::ExemplarSet;
use tempfile::TempDir;

pub const AS_OF: (i32, u32, u32) = (1998, 1, 15);

const SCHEMA_SQL: &str = r#"
CREATE TABLE "Categories" ("CategoryID" INTEGER PRIMARY KEY, "CategoryName" TEXT NOT NULL);
CREATE TABLE "Products" ("ProductID" INTEGER PRIMARY KEY, "ProductName" TEXT NOT NULL,
                         "CategoryID" INTEGER, "UnitPrice" REAL);
CREATE TABLE "Customers" ("CustomerID" TEXT PRIMARY KEY, "CompanyName" TEXT NOT NULL, "Country" TEXT);
CREATE TABLE "Orders" ("OrderID" INTEGER PRIMARY KEY, "CustomerID" TEXT, "OrderDate" TEXT);
CREATE TABLE "Order Details" ("OrderID" INTEGER, "ProductID" INTEGER, "UnitPrice" REAL,
                              "Quantity" INTEGER, "Discount" REAL);

INSERT INTO "Categories" VALUES (1, 'Beverages'), (2, 'Condiments');
INSERT INTO "Products" VALUES (1, 'Chai', 1, 18.0), (2, 'Aniseed Syrup', 2, 10.0);
INSERT INTO "Customers" VALUES ('ALFKI', 'Alfreds Futterkiste', 'Germany'),
                               ('BONAP', 'Bon app', 'France');

INSERT INTO "Orders" VALUES (10248, 'ALFKI', '1997-07-04 00:00:00'),
                            (10249, 'BONAP', '1997-07-05 00:00:00'),
                            (10250, 'ALFKI', '1996-12-01 00:00:00');

-- Summer 1997: (10 x 2 x 1.0) + (5 x 1 x 0.9) over two orders gives an AOV of 12.25.
INSERT INTO "Order Details" VALUES (10248, 1, 10.0, 2, 0.0),
                                   (10249, 2, 5.0, 1, 0.1),
                                   (10250, 1, 18.0, 1, 0.0),
                                   (10250, 2, 10.0, 3, 0.0);
"#;

const PRODUCT_POLICY: &str = "# Returns & Policy

## Returns
- Unopened Beverages: 14 days return window.
- Perishables (Dairy, Seafood): no returns.
";

const MARKETING_CALENDAR: &str = "# Marketing Calendar 1997

## Summer Beverages Campaign
- Dates: 1997-06-01 to 1997-08-31
- Notes: Focus on Beverages and Condiments.

## Winter Classics
- Dates: 1997-12-01 to 1997-12-31
- Notes: Push Dairy Products and Confections for holiday gifting.
";

const KPI_DEFINITIONS: &str = "# KPI Definitions

## Average Order Value (AOV)
- AOV = SUM(UnitPrice * Quantity * (1 - Discount)) / COUNT(DISTINCT OrderID).

## Gross Margin
- GM = SUM((UnitPrice - CostOfGoods) * Quantity * (1 - Discount)).
- When cost is missing, approximate CostOfGoods as 70% of UnitPrice.
";

pub struct Fixture {
    pub dir: TempDir,
    pub db_path: PathBuf,
    pub docs_path: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("data").join("northwind.sqlite");
        let docs_path = dir.path().join("docs");
        write_database(&db_path);
        write_corpus(&docs_path);
        Self { dir, db_path, docs_path }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

pub fn write_database(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(SCHEMA_SQL).unwrap();
}

pub fn write_corpus(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("product_policy.md"), PRODUCT_POLICY).unwrap();
    std::fs::write(dir.join("marketing_calendar.md"), MARKETING_CALENDAR).unwrap();
    std::fs::write(dir.join("kpi_definitions.md"), KPI_DEFINITIONS).unwrap();
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        top_k: 3,
        max_attempts: 2,
        query_timeout: Duration::from_secs(5),
        as_of: NaiveDate::from_ymd_opt(AS_OF.0, AS_OF.1, AS_OF.2).unwrap(),
    }
}

/// A pipeline over the fixture, with `store` standing in for the database
/// when given.
pub fn pipeline_with(
    fixture: &Fixture,
    store: Option<Arc<dyn RelationalStore>>,
    model: Option<Arc<dyn LanguageModel>>,
) -> Pipeline {
    let settings = settings();
    let exemplars = ExemplarSet::baseline();
    let sqlite: Arc<dyn RelationalStore> = Arc::new(SqliteStore::open(&fixture.db_path).unwrap());
    let schema =
        Arc::new(SchemaMetadata::introspect(sqlite.as_ref(), &exemplars.params, settings.query_timeout).unwrap());
    let retriever = Arc::new(Retriever::from_documents(load_corpus(&fixture.docs_path).unwrap()));

    Pipeline::new(schema, retriever, store.unwrap_or(sqlite), Arc::new(exemplars), model, settings)
}

pub fn pipeline(fixture: &Fixture) -> Pipeline {
    pipeline_with(fixture, None, None)
}
