//! # Catalog
//!
//! Shared definitions for the directory: collection names, typed create payloads
//! and the JSON fixture bank used to seed a store.
//!
//! Fixture files live in one directory, one file per collection:
//! - `bootcamps.json`
//! - `courses.json`
//! - `reviews.json`
//!
//! Each file is a JSON array of documents. Documents may carry their own `_id`,
//! which is kept so course/review references into bootcamps stay valid.
use std::{fmt, fs, path::Path};

use anyhow::{Context, Error};
use serde_json::{Map, Value};

pub mod models;

pub type Document = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    Bootcamps,
    Courses,
    Reviews,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Bootcamps, Resource::Courses, Resource::Reviews];

    pub fn collection(&self) -> &'static str {
        match self {
            Resource::Bootcamps => "bootcamps",
            Resource::Courses => "courses",
            Resource::Reviews => "reviews",
        }
    }

    /// Singular, capitalized name used in client-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            Resource::Bootcamps => "Bootcamp",
            Resource::Courses => "Course",
            Resource::Reviews => "Review",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

#[derive(Debug, Default)]
pub struct Fixtures {
    pub bootcamps: Vec<Document>,
    pub courses: Vec<Document>,
    pub reviews: Vec<Document>,
}

impl Fixtures {
    pub fn get(&self, resource: Resource) -> &[Document] {
        match resource {
            Resource::Bootcamps => &self.bootcamps,
            Resource::Courses => &self.courses,
            Resource::Reviews => &self.reviews,
        }
    }

    pub fn len(&self) -> usize {
        self.bootcamps.len() + self.courses.len() + self.reviews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn load_fixtures(dir: impl AsRef<Path>) -> Result<Fixtures, Error> {
    let dir = dir.as_ref();

    Ok(Fixtures {
        bootcamps: read_collection(dir, Resource::Bootcamps)?,
        courses: read_collection(dir, Resource::Courses)?,
        reviews: read_collection(dir, Resource::Reviews)?,
    })
}

fn read_collection(dir: &Path, resource: Resource) -> Result<Vec<Document>, Error> {
    let path = dir.join(format!("{}.json", resource.collection()));

    if !path.exists() {
        return Ok(Vec::new());
    }

    let data = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let documents: Vec<Document> =
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;

    Ok(documents)
}
