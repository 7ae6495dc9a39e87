// On-disk test-case fixtures
//
// Layout: <base>/<problem>/tests/inputs/* and <base>/<problem>/tests/outputs/*,
// one file per case, paired by sorted file name.

use crate::types::TestCaseSet;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ProblemFixture {
    pub problem_name: String,
    pub cases: TestCaseSet,
}

/// Read every problem directory under `base`.
///
/// Problems without a `tests` directory are skipped. A problem whose files
/// cannot be read, or whose input and output counts differ, is returned as
/// its own `Err` entry and the scan moves on to the next problem.
pub fn read_fixtures(base: &Path) -> io::Result<Vec<Result<ProblemFixture, String>>> {
    let mut problem_dirs: Vec<_> = fs::read_dir(base)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    problem_dirs.sort();

    let mut fixtures = Vec::new();
    for dir in problem_dirs {
        let problem_name = match dir.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };

        let tests_dir = dir.join("tests");
        if !tests_dir.exists() {
            continue;
        }

        let (inputs, outputs) = match read_problem(&tests_dir) {
            Ok(pair) => pair,
            Err(e) => {
                fixtures.push(Err(format!("{}: {}", problem_name, e)));
                continue;
            }
        };
        let (n_in, n_out) = (inputs.len(), outputs.len());

        fixtures.push(match TestCaseSet::new(inputs, outputs) {
            Some(cases) => Ok(ProblemFixture { problem_name, cases }),
            None => Err(format!(
                "{}: {} inputs but {} outputs",
                problem_name, n_in, n_out
            )),
        });
    }

    Ok(fixtures)
}

fn read_problem(tests_dir: &Path) -> io::Result<(Vec<String>, Vec<String>)> {
    let inputs = read_case_files(&tests_dir.join("inputs"))?;
    let outputs = read_case_files(&tests_dir.join("outputs"))?;
    Ok((inputs, outputs))
}

/// Contents of every regular file in `dir`, sorted by file name.
/// A missing directory yields no cases.
fn read_case_files(dir: &Path) -> io::Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    files
        .iter()
        .map(|file| {
            fs::read_to_string(file)
                .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", file.display(), e)))
        })
        .collect()
}
