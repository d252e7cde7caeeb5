use std::fs::{self, File};
use std::path::PathBuf;

use fake::faker::name::en::Name;
use fake::Fake;
use rusqlite::{params, Connection};

use mergedb::db::{Attribute, CompareOp, Condition, Config, Context, Schema, Type, Value};
use mergedb::vm::{
    BufferManager, CostEstimator, CostModel, Direction, Distinct, Operator, OrderBy, Plan,
    Project, Scan, Select, SortMergeJoin,
};
use mergedb::{Level, Result, Rng, Tuple};

const EMPLOYEES: usize = 300;
const DEPARTMENTS: i32 = 10;

/// A private work directory with the tables of a small company, loaded both
/// here and in SQLite so results can be checked against it.
struct State {
    dir: PathBuf,
    ctx: Context,
    employees: Vec<Tuple>,
    departments: Vec<Tuple>,
    sqlite: Connection,
}

impl State {
    fn new() -> Self {
        Self::with_config(Config::default().with_page_size(128).with_buffers(4))
    }

    fn with_config(config: Config) -> Self {
        let mut rng = Rng::new();
        let dir = std::env::temp_dir().join(format!("mergedb-test-{:x}", rng.u64(..)));
        fs::create_dir_all(&dir).unwrap();

        let employees: Vec<Tuple> = (1..=EMPLOYEES as i32)
            .map(|id| {
                let name: String = Name().fake();
                let dept: i32 = (1..=8).fake();
                Tuple::new(vec![id.into(), name.into(), dept.into()])
            })
            .collect();

        let departments: Vec<Tuple> = (1..=DEPARTMENTS)
            .map(|id| Tuple::new(vec![id.into(), format!("department {id}").into()]))
            .collect();

        let sqlite = Connection::open_in_memory().unwrap();
        sqlite
            .execute_batch(
                "CREATE TABLE employees (id INTEGER, name TEXT, dept INTEGER);
                 CREATE TABLE departments (id INTEGER, title TEXT);",
            )
            .unwrap();

        for tuple in &employees {
            sqlite
                .execute(
                    "INSERT INTO employees VALUES (?1, ?2, ?3)",
                    params![int(&tuple[0]), text(&tuple[1]), int(&tuple[2])],
                )
                .unwrap();
        }
        for tuple in &departments {
            sqlite
                .execute(
                    "INSERT INTO departments VALUES (?1, ?2)",
                    params![int(&tuple[0]), text(&tuple[1])],
                )
                .unwrap();
        }

        Self {
            ctx: Context::new(config.with_work_dir(&dir)),
            dir,
            employees,
            departments,
            sqlite,
        }
    }

    fn employees(&self) -> Plan<File> {
        let schema = Schema::new(vec![
            attr("employees", "id", Type::Int),
            attr("employees", "name", Type::String).with_byte_size(16),
            attr("employees", "dept", Type::Int),
        ]);

        Plan::from(Scan::new("employees", schema, self.employees.clone(), &self.ctx))
    }

    fn departments(&self) -> Plan<File> {
        let schema = Schema::new(vec![
            attr("departments", "id", Type::Int),
            attr("departments", "title", Type::String).with_byte_size(16),
        ]);

        Plan::from(Scan::new("departments", schema, self.departments.clone(), &self.ctx))
    }

    fn join(&self) -> Result<Plan<File>> {
        let condition = Condition::equals(
            attr("employees", "dept", Type::Int),
            attr("departments", "id", Type::Int),
        );

        Ok(Plan::from(SortMergeJoin::new(
            self.employees(),
            self.departments(),
            vec![condition],
            &self.ctx,
        )?))
    }

    /// Files left in the run directory.
    fn run_files(&self) -> usize {
        fs::read_dir(self.dir.join("mergedb.temp"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

impl Drop for State {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.dir).expect("Failed to drop State")
    }
}

fn attr(relation: &str, name: &str, data_type: Type) -> Attribute {
    Attribute::new(relation, name, data_type)
}

fn int(value: &Value) -> i32 {
    match value {
        Value::Int(num) => *num,
        other => panic!("expected an integer but got {other}"),
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(string) => string.clone(),
        other => panic!("expected a string but got {other}"),
    }
}

fn drain(plan: &mut impl Operator) -> Result<Vec<Tuple>> {
    plan.open()?;
    let mut output = Vec::new();
    while let Some(page) = plan.next()? {
        output.extend(page);
    }
    plan.close()?;

    Ok(output)
}

#[test]
fn sort_merge_join_matches_sqlite() -> Result<()> {
    let db = State::new();
    let mut plan = db.join()?;
    BufferManager::allocate(db.ctx.config(), &mut plan);

    let mut joined: Vec<(i32, String, i32, i32, String)> = drain(&mut plan)?
        .iter()
        .map(|t| (int(&t[0]), text(&t[1]), int(&t[2]), int(&t[3]), text(&t[4])))
        .collect();
    joined.sort();

    let mut stmt = db
        .sqlite
        .prepare(
            "SELECT e.id, e.name, e.dept, d.id, d.title
             FROM employees AS e JOIN departments AS d ON e.dept = d.id
             ORDER BY e.id",
        )
        .unwrap();
    let expected: Vec<(i32, String, i32, i32, String)> = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();

    assert_eq!(joined.len(), EMPLOYEES);
    assert_eq!(joined, expected);
    assert_eq!(db.run_files(), 0);

    Ok(())
}

#[test]
fn order_by_descending_matches_sqlite() -> Result<()> {
    let db = State::new();
    let keys = vec![
        attr("employees", "name", Type::String),
        attr("employees", "id", Type::Int),
    ];
    let mut plan = OrderBy::new(db.employees(), keys, Direction::Desc, &db.ctx)?;

    let sorted: Vec<(String, i32)> = drain(&mut plan)?
        .iter()
        .map(|t| (text(&t[1]), int(&t[0])))
        .collect();

    let mut stmt = db
        .sqlite
        .prepare("SELECT name, id FROM employees ORDER BY name DESC, id DESC")
        .unwrap();
    let expected: Vec<(String, i32)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();

    assert_eq!(sorted, expected);
    assert_eq!(db.run_files(), 0);

    Ok(())
}

#[test]
fn distinct_departments_match_sqlite() -> Result<()> {
    let db = State::new();
    let project = Project::new(db.employees(), &[attr("employees", "dept", Type::Int)])?;
    let mut plan = Distinct::new(Plan::from(project), &db.ctx)?;

    let departments: Vec<i32> = drain(&mut plan)?.iter().map(|t| int(&t[0])).collect();

    let mut stmt = db
        .sqlite
        .prepare("SELECT DISTINCT dept FROM employees ORDER BY dept")
        .unwrap();
    let expected: Vec<i32> = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();

    assert_eq!(departments, expected);

    Ok(())
}

#[test]
fn selection_below_join() -> Result<()> {
    let db = State::new();
    let condition = Condition::literal(attr("employees", "dept", Type::Int), CompareOp::Le, 3);
    let select = Select::new(db.employees(), condition)?;
    let mut plan = Plan::from(SortMergeJoin::new(
        Plan::from(select),
        db.departments(),
        vec![Condition::equals(
            attr("departments", "id", Type::Int),
            attr("employees", "dept", Type::Int),
        )],
        &db.ctx,
    )?);

    let output = drain(&mut plan)?;

    let expected: i64 = db
        .sqlite
        .query_row("SELECT COUNT(*) FROM employees WHERE dept <= 3", [], |row| {
            row.get(0)
        })
        .unwrap();

    assert_eq!(output.len() as i64, expected);
    assert!(output.iter().all(|t| int(&t[2]) <= 3 && int(&t[2]) == int(&t[3])));

    Ok(())
}

#[test]
fn tiny_budget_is_rejected_at_open() -> Result<()> {
    let db = State::with_config(Config::default().with_page_size(128).with_buffers(1));
    let mut plan = OrderBy::new(db.employees(), vec![], Direction::Asc, &db.ctx)?;

    assert!(plan.open().is_err());
    plan.close()?;
    assert_eq!(db.run_files(), 0);

    Ok(())
}

#[test]
fn cost_from_statistics_files() -> Result<()> {
    let db = State::new();
    let names = db
        .sqlite
        .query_row("SELECT COUNT(DISTINCT name) FROM employees", [], |row| {
            row.get::<_, i64>(0)
        })
        .unwrap();

    fs::write(
        db.dir.join("employees.stat"),
        format!("{EMPLOYEES}\n{EMPLOYEES} {names} 8\n"),
    )?;
    fs::write(
        db.dir.join("departments.stat"),
        format!("{DEPARTMENTS}\n{DEPARTMENTS} {DEPARTMENTS}\n"),
    )?;

    let plan = db.join()?;
    let mut model = CostModel::new();
    model.load_statistics(&db.dir, "employees", db.employees().schema())?;
    model.load_statistics(&db.dir, "departments", db.departments().schema())?;

    let estimate = plan.estimate(&model)?;

    // 300 * 10 / max(8, 10)
    assert_eq!(estimate.rows, 300);
    assert!(estimate.is_feasible());
    assert_eq!(
        estimate.distinct_of(&attr("employees", "dept", Type::Int)),
        Some(8)
    );

    Ok(())
}

#[test]
fn plan_display() -> Result<()> {
    let db = State::new();
    let select = Select::new(
        db.employees(),
        Condition::literal(attr("employees", "dept", Type::Int), CompareOp::Ne, 3),
    )?;
    let join = SortMergeJoin::new(
        Plan::from(select),
        db.departments(),
        vec![Condition::equals(
            attr("employees", "dept", Type::Int),
            attr("departments", "id", Type::Int),
        )],
        &db.ctx,
    )?;
    let plan = Plan::from(OrderBy::new(
        Plan::from(join),
        vec![attr("employees", "name", Type::String)],
        Direction::Desc,
        &db.ctx,
    )?);

    assert_eq!(plan.joins(), 1);
    assert_eq!(
        plan.to_string(),
        "OrderBy employees.name DESC\n\
         └── Sort-Merge Join on employees.dept = departments.id\n    \
             ├── Select where employees.dept != 3\n    \
             │   └── Scan on employees\n    \
             └── Scan on departments\n"
    );

    Ok(())
}

#[test]
fn logging_records_buffer_allocation() -> Result<()> {
    let db = State::new();
    let config = db.ctx.config().clone().with_log_level(Level::Info);
    config.init_logging()?;

    let mut plan = db.join()?;
    BufferManager::allocate(&config, &mut plan);

    let logged = fs::read_to_string(db.dir.join("mergedb.log"))?;
    assert!(logged.contains("[INFO]"));
    assert!(logged.contains("4 buffer pages shared by 1 joins"));

    Ok(())
}
