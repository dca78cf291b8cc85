use std::collections::BTreeMap;
use std::rc::Rc;

use approx::assert_abs_diff_eq;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::config::{SimulationConfig, DEFAULT_MIN_TIME_BETWEEN_EVENTS};
use crate::data::DataItem;
use crate::element::DiskElement;
use crate::id::DiskId;
use crate::task::{ScheduledTask, Task, TaskFailReason, TaskStatus};

use super::{DualResourceScheduler, TaskScheduler};

fn make_scheduler(disks: Vec<DiskElement>) -> DualResourceScheduler {
    make_scheduler_with_config(disks, SimulationConfig::default())
}

fn make_scheduler_with_config(disks: Vec<DiskElement>, config: SimulationConfig) -> DualResourceScheduler {
    let mut scheduler = DualResourceScheduler::new("vm-0", 0, &config);
    scheduler.set_reachable_disks(disks);
    scheduler
}

fn item_on(id: u32, disks: &[DiskId]) -> Rc<DataItem> {
    Rc::new(DataItem::new(id, 1024, disks.iter().copied()))
}

/// Creates disks with the given IDs which store the listed items residing on them.
fn disks(ids: &[DiskId], items: &[&Rc<DataItem>]) -> Vec<DiskElement> {
    ids.iter()
        .map(|id| {
            let mut disk = DiskElement::new(*id, 100.);
            for item in items {
                disk.store(item);
            }
            disk
        })
        .collect()
}

/// Advances scheduler with constant shares until there are no more events and returns the finished tasks.
fn run_to_completion(
    scheduler: &mut DualResourceScheduler,
    cpu_shares: &[f64],
    io_shares: &[(DiskId, f64)],
) -> Vec<ScheduledTask> {
    let mut next = scheduler.advance(scheduler.time(), cpu_shares, io_shares);
    let mut steps = 0;
    while next.is_finite() {
        next = scheduler.advance(next, cpu_shares, io_shares);
        steps += 1;
        assert!(steps < 10000, "scheduler does not converge");
    }
    let mut finished = Vec::new();
    while let Some(task) = scheduler.get_next_finished() {
        finished.push(task);
    }
    finished
}

#[test]
// One task with CPU work of 5 seconds and I/O work of 12 seconds: execution time is max(5, 12).
fn matched_dual_resource_task() {
    let item = item_on(0, &[0]);
    let mut scheduler = make_scheduler(disks(&[0], &[&item]));
    let cpu = [250.];
    let io = [(0, 100.)];
    scheduler.advance(0., &cpu, &io);

    let task = Task::new(0, 1250, 0).with_io(1200, 1).with_data_item(item);
    assert_eq!(scheduler.submit(task, 0.), Some(5.));

    let finished = run_to_completion(&mut scheduler, &cpu, &io);
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].status(), TaskStatus::Success);
    assert_abs_diff_eq!(finished[0].exec_time().unwrap(), 12., epsilon = 0.01);
    assert_eq!(finished[0].cpu_done(), 1250);
    assert_eq!(finished[0].io_done(), 1200);
}

#[test]
// Task 1 needs 2s of CPU and 1s of I/O, task 2 needs 1s of CPU and 2s of I/O.
// Both resources are shared in half until t=2, then each task has one resource for itself, both finish at t=3.
fn two_competing_tasks() {
    let item = item_on(0, &[0]);
    let mut scheduler = make_scheduler(disks(&[0], &[&item]));
    let cpu = [250.];
    let io = [(0, 100.)];
    scheduler.advance(0., &cpu, &io);
    scheduler.submit(Task::new(1, 500, 0).with_io(100, 1).with_data_item(item.clone()), 0.);
    scheduler.submit(Task::new(2, 250, 0).with_io(200, 1).with_data_item(item), 0.);

    let next = scheduler.advance(0., &cpu, &io);
    assert_abs_diff_eq!(next, 2., epsilon = 1e-9);
    let next = scheduler.advance(next, &cpu, &io);
    assert_abs_diff_eq!(next, 3., epsilon = 1e-9);
    assert_eq!(scheduler.task(1).unwrap().remaining_cpu(), 250);
    assert_eq!(scheduler.task(1).unwrap().remaining_io(), 0);
    assert_eq!(scheduler.task(2).unwrap().remaining_cpu(), 0);
    assert_eq!(scheduler.task(2).unwrap().remaining_io(), 100);

    let finished = run_to_completion(&mut scheduler, &cpu, &io);
    assert_eq!(finished.len(), 2);
    for task in finished {
        assert_abs_diff_eq!(task.finish_time().unwrap(), 3., epsilon = 0.01);
    }
}

#[test]
fn identical_tasks_finish_together() {
    let item = item_on(0, &[0]);
    let mut scheduler = make_scheduler(disks(&[0], &[&item]));
    let cpu = [250.];
    let io = [(0, 100.)];
    scheduler.advance(0., &cpu, &io);
    for id in 0..4 {
        scheduler.submit(Task::new(id, 1000, 0).with_io(400, 1).with_data_item(item.clone()), 0.);
    }
    let finished = run_to_completion(&mut scheduler, &cpu, &io);
    assert_eq!(finished.len(), 4);
    for task in &finished {
        assert_abs_diff_eq!(task.finish_time().unwrap(), 16., epsilon = 0.1);
        assert_abs_diff_eq!(
            task.finish_time().unwrap(),
            finished[0].finish_time().unwrap(),
            epsilon = 1e-9
        );
    }
}

#[test]
fn submission_order_does_not_affect_finish_times() {
    let cpu = [250., 250.];
    let io = [(0, 100.), (1, 80.)];
    let tasks: Vec<(u32, u64, u64, DiskId)> = (0..8)
        .map(|i| (i, 100 * (i as u64 + 1), 50 * (8 - i as u64), i % 2))
        .collect();

    let items: Vec<Rc<DataItem>> = tasks.iter().map(|(id, _, _, disk)| item_on(*id, &[*disk])).collect();
    let item_refs: Vec<&Rc<DataItem>> = items.iter().collect();

    let run = |order: &[(u32, u64, u64, DiskId)]| -> BTreeMap<u32, f64> {
        let mut scheduler = make_scheduler(disks(&[0, 1], &item_refs));
        scheduler.advance(0., &cpu, &io);
        for (id, cpu_length, io_length, _) in order {
            let task = Task::new(*id, *cpu_length, 0)
                .with_io(*io_length, 1)
                .with_data_item(items[*id as usize].clone());
            scheduler.submit(task, 0.);
        }
        run_to_completion(&mut scheduler, &cpu, &io)
            .into_iter()
            .map(|task| (task.id(), task.finish_time().unwrap()))
            .collect()
    };

    let baseline = run(&tasks[..]);
    assert_eq!(baseline.len(), tasks.len());
    let mut rng = Pcg64::seed_from_u64(123);
    for _ in 0..10 {
        let mut order = tasks.clone();
        order.shuffle(&mut rng);
        let result = run(&order[..]);
        for (id, time) in &baseline {
            assert_abs_diff_eq!(result[id], *time, epsilon = 1e-6);
        }
    }
}

#[test]
fn task_without_io_depends_on_cpu_only() {
    let configs: Vec<Vec<DiskId>> = vec![vec![], vec![0], vec![0, 1]];
    for reachable in configs {
        let mut scheduler = make_scheduler(disks(&reachable, &[]));
        let cpu = [1.];
        let io: Vec<(DiskId, f64)> = reachable.iter().map(|disk| (*disk, 100.)).collect();
        scheduler.advance(0., &cpu, &io);
        // data item location does not matter when there is no I/O
        let task = Task::new(0, 10, 0).with_data_item(item_on(0, &[5]));
        assert_eq!(scheduler.submit(task, 0.), Some(10.));
        let finished = run_to_completion(&mut scheduler, &cpu, &io);
        assert_eq!(finished.len(), 1);
        assert_abs_diff_eq!(finished[0].exec_time().unwrap(), 10., epsilon = 0.01);
        assert_eq!(finished[0].io_done(), 0);
    }
}

#[test]
fn remaining_work_never_increases() {
    let item = item_on(0, &[0]);
    let mut scheduler = make_scheduler(disks(&[0], &[&item]));
    let cpu = [100.];
    let io = [(0, 50.)];
    scheduler.advance(0., &cpu, &io);
    for id in 0..3 {
        let task = Task::new(id, 300 + 200 * id as u64, 0)
            .with_io(100 * (3 - id as u64), 1)
            .with_data_item(item.clone());
        scheduler.submit(task, 0.);
    }
    let mut last = vec![(u64::MAX, u64::MAX); 3];
    let mut time = 0.;
    while scheduler.running_count() > 0 {
        time += 0.5;
        scheduler.advance(time, &cpu, &io);
        for id in 0..3 {
            if let Some(task) = scheduler.task(id) {
                let (cpu_before, io_before) = last[id as usize];
                assert!(task.remaining_cpu() <= cpu_before);
                assert!(task.remaining_io() <= io_before);
                last[id as usize] = (task.remaining_cpu(), task.remaining_io());
            }
        }
        assert!(time < 1000.);
    }
}

#[test]
fn unreachable_data_fails_at_submission() {
    let item = item_on(0, &[2]);
    let mut scheduler = make_scheduler(disks(&[1], &[&item]));
    scheduler.advance(0., &[100.], &[(1, 100.)]);
    let task = Task::new(0, 100, 0).with_io(100, 1).with_data_item(item);
    assert_eq!(scheduler.submit(task, 0.), None);
    assert_eq!(scheduler.running_count(), 0);
    assert!(!scheduler.is_finished_available());

    let failed = scheduler.take_failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status(), TaskStatus::Failed);
    assert_eq!(failed[0].fail_reason(), Some(TaskFailReason::DataUnreachable));
    assert_eq!(failed[0].exec_time(), None);
    assert!(scheduler.take_failed().is_empty());
}

#[test]
fn unreachable_data_stalls_when_not_failing_fast() {
    let config = SimulationConfig {
        fail_on_unreachable_data: false,
        ..Default::default()
    };
    let item = item_on(0, &[1]);
    let mut scheduler = make_scheduler_with_config(disks(&[0], &[&item]), config);
    let cpu = [100.];
    let io = [(0, 100.)];
    scheduler.advance(0., &cpu, &io);
    let task = Task::new(0, 100, 0).with_io(100, 1).with_data_item(item);
    assert_eq!(scheduler.submit(task, 0.), Some(1.));
    assert_eq!(scheduler.stalled_count(), 1);

    let next = scheduler.advance(0., &cpu, &io);
    assert_eq!(next, 1.);
    let next = scheduler.advance(next, &cpu, &io);
    assert_eq!(next, f64::INFINITY);
    assert_eq!(scheduler.running_count(), 1);
    assert_eq!(scheduler.task(0).unwrap().remaining_cpu(), 0);
    assert_eq!(scheduler.task(0).unwrap().remaining_io(), 100);

    assert_eq!(scheduler.fail_all(TaskFailReason::HostAccessLost), 1);
    assert_eq!(scheduler.take_failed()[0].fail_reason(), Some(TaskFailReason::HostAccessLost));
}

#[test]
fn file_transfer_extends_cpu_length() {
    let mut scheduler = make_scheduler(Vec::new());
    let cpu = [100.];
    scheduler.advance(0., &cpu, &[]);
    assert_eq!(scheduler.submit(Task::new(0, 1000, 0), 2.), Some(12.));
    assert_eq!(scheduler.task(0).unwrap().cpu_length(), 1200);
    let finished = run_to_completion(&mut scheduler, &cpu, &[]);
    assert_abs_diff_eq!(finished[0].exec_time().unwrap(), 12., epsilon = 0.01);
    assert_eq!(finished[0].task().cpu_length(), 1000);
}

#[test]
fn pause_and_resume() {
    let mut scheduler = make_scheduler(Vec::new());
    let cpu = [100.];
    scheduler.advance(0., &cpu, &[]);
    scheduler.submit(Task::new(0, 1000, 0), 0.);
    scheduler.advance(4., &cpu, &[]);
    assert!(scheduler.pause(0));
    assert_eq!(scheduler.running_count(), 0);
    assert_eq!(scheduler.paused_count(), 1);
    assert_eq!(scheduler.task(0).unwrap().status(), TaskStatus::Paused);
    assert_eq!(scheduler.task(0).unwrap().remaining_cpu(), 600);

    // paused task does not progress
    assert_eq!(scheduler.advance(6., &cpu, &[]), f64::INFINITY);
    assert_eq!(scheduler.task(0).unwrap().remaining_cpu(), 600);

    assert_eq!(scheduler.resume(0), Some(12.));
    assert_eq!(scheduler.resume(0), None);
    let finished = run_to_completion(&mut scheduler, &cpu, &[]);
    assert_eq!(finished.len(), 1);
    assert_abs_diff_eq!(finished[0].finish_time().unwrap(), 12., epsilon = 0.01);
}

#[test]
fn done_task_is_finished_instead_of_paused_or_canceled() {
    let mut scheduler = make_scheduler(Vec::new());
    scheduler.advance(1., &[100.], &[]);
    assert_eq!(scheduler.submit(Task::new(0, 0, 0), 0.), Some(1.));
    assert!(scheduler.pause(0));
    assert_eq!(scheduler.paused_count(), 0);
    assert!(scheduler.is_finished_available());
    assert_eq!(scheduler.get_next_finished().unwrap().status(), TaskStatus::Success);

    scheduler.submit(Task::new(1, 0, 0), 0.);
    let task = scheduler.cancel(1).unwrap();
    assert_eq!(task.status(), TaskStatus::Success);
    assert!(!scheduler.is_finished_available());
}

#[test]
fn cancel_running_and_unknown_tasks() {
    let mut scheduler = make_scheduler(Vec::new());
    let cpu = [100.];
    scheduler.advance(0., &cpu, &[]);
    scheduler.submit(Task::new(0, 1000, 0), 0.);
    scheduler.advance(2., &cpu, &[]);

    let task = scheduler.cancel(0).unwrap();
    assert_eq!(task.status(), TaskStatus::Canceled);
    assert_eq!(task.cpu_done(), 200);
    assert_eq!(task.exec_time(), None);
    assert_eq!(scheduler.running_count(), 0);

    assert!(scheduler.cancel(0).is_none());
    assert!(!scheduler.pause(42));
    assert_eq!(scheduler.resume(42), None);
}

#[test]
fn cancel_returns_finished_task() {
    let mut scheduler = make_scheduler(Vec::new());
    let cpu = [100.];
    scheduler.advance(0., &cpu, &[]);
    scheduler.submit(Task::new(0, 100, 0), 0.);
    scheduler.advance(1., &cpu, &[]);
    assert!(scheduler.is_finished_available());
    assert_eq!(scheduler.cancel(0).unwrap().status(), TaskStatus::Success);
    assert!(!scheduler.is_finished_available());
}

#[test]
fn fail_all_fails_running_and_paused_tasks() {
    let mut scheduler = make_scheduler(Vec::new());
    scheduler.advance(0., &[100.], &[]);
    scheduler.submit(Task::new(0, 1000, 0), 0.);
    scheduler.submit(Task::new(1, 1000, 0), 0.);
    scheduler.pause(1);
    assert_eq!(scheduler.fail_all(TaskFailReason::OutOfMemory), 2);
    assert_eq!(scheduler.running_count(), 0);
    assert_eq!(scheduler.paused_count(), 0);
    let failed = scheduler.take_failed();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|task| task.status() == TaskStatus::Failed));
    assert_eq!(scheduler.fail_all(TaskFailReason::OutOfMemory), 0);
}

#[test]
fn next_event_is_not_closer_than_min_delay() {
    let mut scheduler = make_scheduler(Vec::new());
    let cpu = [1000.];
    scheduler.advance(0., &cpu, &[]);
    assert_eq!(scheduler.submit(Task::new(0, 1, 0), 0.), Some(0.1));
    assert_eq!(scheduler.advance(0., &cpu, &[]), 0.1);
    scheduler.advance(0.1, &cpu, &[]);
    assert_eq!(scheduler.get_next_finished().unwrap().finish_time(), Some(0.1));
}

#[test]
fn single_task_cannot_use_more_than_one_pe() {
    let mut scheduler = make_scheduler(Vec::new());
    let cpu = [100., 100.];
    scheduler.advance(0., &cpu, &[]);
    assert_eq!(scheduler.submit(Task::new(0, 1000, 0), 0.), Some(10.));
    let finished = run_to_completion(&mut scheduler, &cpu, &[]);
    assert_abs_diff_eq!(finished[0].exec_time().unwrap(), 10., epsilon = 0.01);
}

#[test]
fn cpu_is_shared_between_consumers_when_oversubscribed() {
    let mut scheduler = make_scheduler(Vec::new());
    let cpu = [100., 100.];
    scheduler.advance(0., &cpu, &[]);
    for id in 0..3 {
        scheduler.submit(Task::new(id, 1000, 0), 0.);
    }
    let pes: Vec<usize> = (0..3).map(|id| scheduler.task(id).unwrap().pe_index()).collect();
    assert_eq!(pes, vec![0, 1, 0]);
    let finished = run_to_completion(&mut scheduler, &cpu, &[]);
    assert_eq!(finished.len(), 3);
    for task in finished {
        assert_abs_diff_eq!(task.exec_time().unwrap(), 15., epsilon = 0.01);
    }
}

#[test]
fn disks_are_shared_independently() {
    let cpu = [1000.];
    let io = [(0, 100.), (1, 100.)];

    let (first, second) = (item_on(0, &[0]), item_on(1, &[1]));
    let mut scheduler = make_scheduler(disks(&[0, 1], &[&first, &second]));
    scheduler.advance(0., &cpu, &io);
    scheduler.submit(Task::new(0, 10, 0).with_io(500, 1).with_data_item(first), 0.);
    scheduler.submit(Task::new(1, 10, 0).with_io(500, 1).with_data_item(second), 0.);
    for task in run_to_completion(&mut scheduler, &cpu, &io) {
        assert_abs_diff_eq!(task.exec_time().unwrap(), 5., epsilon = 0.01);
    }

    let item = item_on(0, &[0]);
    let mut scheduler = make_scheduler(disks(&[0, 1], &[&item]));
    scheduler.advance(0., &cpu, &io);
    scheduler.submit(Task::new(0, 10, 0).with_io(500, 1).with_data_item(item.clone()), 0.);
    scheduler.submit(Task::new(1, 10, 0).with_io(500, 1).with_data_item(item), 0.);
    for task in run_to_completion(&mut scheduler, &cpu, &io) {
        assert_abs_diff_eq!(task.exec_time().unwrap(), 10., epsilon = 0.01);
    }
}

#[test]
fn io_without_data_item_uses_first_reachable_disk() {
    let mut scheduler = make_scheduler(disks(&[3, 5], &[]));
    scheduler.advance(0., &[100.], &[(3, 10.), (5, 10.)]);
    scheduler.submit(Task::new(0, 10, 0).with_io(10, 2), 0.);
    assert_eq!(scheduler.task(0).unwrap().disk_id(), Some(3));
    assert_eq!(scheduler.task(0).unwrap().remaining_io(), 20);
}

#[test]
fn reachable_disks_update_rebinds_tasks() {
    let item = item_on(0, &[1]);
    let all = disks(&[0, 1], &[&item]);
    let mut scheduler = make_scheduler(all.clone());
    scheduler.advance(0., &[100.], &[(0, 100.), (1, 100.)]);
    scheduler.submit(Task::new(0, 0, 0).with_io(100, 1).with_data_item(item), 0.);
    assert_eq!(scheduler.task(0).unwrap().disk_id(), Some(1));
    assert_eq!(scheduler.stalled_count(), 0);

    scheduler.set_reachable_disks(vec![all[0].clone()]);
    assert_eq!(scheduler.task(0).unwrap().disk_id(), None);
    assert_eq!(scheduler.stalled_count(), 1);

    scheduler.set_reachable_disks(all);
    assert_eq!(scheduler.task(0).unwrap().disk_id(), Some(1));
    assert_eq!(scheduler.stalled_count(), 0);
}

#[test]
fn empty_task_finishes_at_submission_time() {
    let mut scheduler = make_scheduler(Vec::new());
    scheduler.advance(5., &[100.], &[]);
    assert_eq!(scheduler.submit(Task::new(0, 0, 0), 0.), Some(5.));
    assert_eq!(scheduler.advance(5., &[100.], &[]), f64::INFINITY);
    let task = scheduler.get_next_finished().unwrap();
    assert_eq!(task.finish_time(), Some(5.));
    assert_eq!(task.exec_time(), Some(0.));
}

#[test]
fn ram_in_use_counts_running_and_paused_tasks() {
    let mut scheduler = make_scheduler(Vec::new());
    scheduler.advance(0., &[100.], &[]);
    scheduler.submit(Task::new(0, 1000, 128), 0.);
    scheduler.submit(Task::new(1, 1000, 256), 0.);
    scheduler.pause(1);
    assert_eq!(scheduler.ram_in_use(), 384);
    scheduler.cancel(0);
    assert_eq!(scheduler.ram_in_use(), 256);
}

#[test]
// Data item declared on a reachable disk is not readable until it is actually stored there.
fn data_must_be_stored_on_disk() {
    let item = item_on(0, &[0]);
    let mut scheduler = make_scheduler(disks(&[0], &[]));
    scheduler.advance(0., &[100.], &[(0, 100.)]);
    let task = Task::new(0, 10, 0).with_io(10, 1).with_data_item(item.clone());
    assert_eq!(scheduler.submit(task, 0.), None);
    assert_eq!(scheduler.take_failed()[0].fail_reason(), Some(TaskFailReason::DataUnreachable));

    scheduler.set_reachable_disks(disks(&[0], &[&item]));
    let task = Task::new(1, 10, 0).with_io(10, 1).with_data_item(item);
    assert!(scheduler.submit(task, 0.).is_some());
    assert_eq!(scheduler.task(1).unwrap().disk_id(), Some(0));
}

#[test]
fn invalid_min_delay_falls_back_to_default() {
    for min_time_between_events in [0., -1., f64::NAN] {
        let config = SimulationConfig {
            min_time_between_events,
            ..Default::default()
        };
        let scheduler = make_scheduler_with_config(Vec::new(), config);
        assert_eq!(scheduler.min_time_between_events(), DEFAULT_MIN_TIME_BETWEEN_EVENTS);
    }
    let config = SimulationConfig {
        min_time_between_events: 0.5,
        ..Default::default()
    };
    assert_eq!(make_scheduler_with_config(Vec::new(), config).min_time_between_events(), 0.5);
}
