use crate::commands::{run_batch, run_client};
use ems_server::store::MemoryEventStore;
use ems_server::{Server, ServerOptions};
use ems_utils::cli::{BatchCli, ClientCli};
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn batch_runs_every_jobs_file_on_its_own_store() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("a.jobs"),
        "CREATE 1 2 2\nRESERVE 1 [(2,2) (1,1)]\nSHOW 1\nLIST\n",
    )
    .unwrap();
    fs::write(dir.path().join("b.jobs"), "LIST\nSHOW 1\nCREATE 2 1 3\nLIST\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "CREATE 9 1 1\n").unwrap();

    run_batch(&BatchCli {
        jobs_dir: dir.path().to_path_buf(),
        max_jobs: 2,
        max_threads: 1,
        delay_us: 0,
    })
    .unwrap();

    insta::assert_snapshot!(fs::read_to_string(dir.path().join("a.out")).unwrap(), @r###"
    1 0
    0 1
    Event: 1
    "###);
    assert_eq!(
        fs::read_to_string(dir.path().join("b.out")).unwrap(),
        "No events\nEvent: 2\n"
    );
    assert!(!dir.path().join("notes.out").exists());
}

#[test]
fn batch_needs_a_runner_and_a_directory() {
    let dir = tempdir().unwrap();
    assert!(run_batch(&BatchCli {
        jobs_dir: dir.path().to_path_buf(),
        max_jobs: 0,
        max_threads: 1,
        delay_us: 0,
    })
    .is_err());
    assert!(run_batch(&BatchCli {
        jobs_dir: dir.path().to_path_buf(),
        max_jobs: 1,
        max_threads: 0,
        delay_us: 0,
    })
    .is_err());
    assert!(run_batch(&BatchCli {
        jobs_dir: dir.path().join("missing"),
        max_jobs: 1,
        max_threads: 1,
        delay_us: 0,
    })
    .is_err());
}

#[test]
fn batch_threads_share_a_jobs_file_between_barriers() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("shared.jobs"),
        "CREATE 1 1 3\nBARRIER\nRESERVE 1 [(1,1)]\nRESERVE 1 [(1,2)]\nRESERVE 1 [(1,3)]\n\
         BARRIER\nSHOW 1\n",
    )
    .unwrap();

    run_batch(&BatchCli {
        jobs_dir: dir.path().to_path_buf(),
        max_jobs: 1,
        max_threads: 3,
        delay_us: 0,
    })
    .unwrap();

    // the three reservations race, so only the set of ids is fixed
    let shown = fs::read_to_string(dir.path().join("shared.out")).unwrap();
    let mut reservations = shown.split_whitespace().collect::<Vec<_>>();
    reservations.sort_unstable();
    assert_eq!(reservations, ["1", "2", "3"]);
    assert_eq!(shown.lines().count(), 1);
}

#[test]
fn client_runs_a_jobs_file_through_the_server() {
    let dir = tempdir().unwrap();
    let control_pipe = dir.path().join("ctl");
    let mut options = ServerOptions::new(&control_pipe);
    options.max_sessions = 2;
    options.poll_interval = Duration::from_millis(10);
    let server = Server::bind(&options, Arc::new(MemoryEventStore::new())).unwrap();
    let shutdown = server.shutdown_handle();
    let handle = thread::spawn(move || server.run());

    let jobs_file = dir.path().join("c.jobs");
    fs::write(
        &jobs_file,
        "CREATE 10 2 3\nRESERVE 10 [(1,1) (1,2)]\nRESERVE 10 [(1,2)]\nSHOW 10\nLIST\n",
    )
    .unwrap();
    run_client(&ClientCli {
        request_pipe: dir.path().join("c.req"),
        response_pipe: dir.path().join("c.resp"),
        control_pipe: control_pipe.clone(),
        jobs_file,
    })
    .unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("c.out")).unwrap(),
        "1 1 0\n0 0 0\nEvent: 10\n"
    );
    assert!(!dir.path().join("c.req").exists());

    shutdown.request();
    handle.join().unwrap().unwrap();
}
