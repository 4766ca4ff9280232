use git2::{Repository, Signature, Time};
use std::fs;
use std::path::Path;

/// Write or delete `files` in the working tree and commit them on top of
/// HEAD at `when` (epoch seconds). `None` content removes the path.
pub(crate) fn commit_files(repo: &Repository, files: &[(&str, Option<&str>)], when: i64) -> String {
    let workdir = repo.workdir().unwrap().to_path_buf();
    let mut index = repo.index().unwrap();
    for (path, content) in files {
        let full = workdir.join(path);
        match content {
            Some(content) => {
                fs::create_dir_all(full.parent().unwrap()).unwrap();
                fs::write(&full, content).unwrap();
                index.add_path(Path::new(path)).unwrap();
            }
            None => {
                fs::remove_file(&full).unwrap();
                index.remove_path(Path::new(path)).unwrap();
            }
        }
    }
    index.write().unwrap();

    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::new("Dev", "dev@example.com", &Time::new(when, 0)).unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    repo.commit(Some("HEAD"), &sig, &sig, "change", &tree, &parents)
        .unwrap()
        .to_string()
}
