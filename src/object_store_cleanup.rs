use serde::Serialize;

use crate::bucket::{BucketKind, AVATAR_ROOT};
use crate::error::StorageResult;
use crate::path::{validate_prefix, validate_segment};
use crate::s3::ObjectStore;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupStats {
    pub objects_examined: u64,
    pub objects_deleted: u64,
}

impl CleanupStats {
    fn merge(&mut self, other: CleanupStats) {
        self.objects_examined += other.objects_examined;
        self.objects_deleted += other.objects_deleted;
    }
}

/// Remove every object in `bucket` whose key starts with `prefix`.
///
/// Lists first, then deletes one key at a time; the first failed delete stops
/// the sweep. With `dry_run` the matching keys are only counted.
pub async fn delete_by_prefix(
    store: &ObjectStore,
    bucket: BucketKind,
    prefix: &str,
    dry_run: bool,
) -> StorageResult<CleanupStats> {
    validate_prefix(prefix)?;

    let keys = store.list(bucket, prefix).await?;
    let mut stats = CleanupStats {
        objects_examined: keys.len() as u64,
        ..CleanupStats::default()
    };

    for key in &keys {
        if !dry_run {
            store.remove_in(bucket, key).await?;
        }
        stats.objects_deleted += 1;
    }

    tracing::info!(
        dry_run,
        bucket = %store.bucket_name(bucket),
        prefix,
        objects_examined = stats.objects_examined,
        objects_deleted = stats.objects_deleted,
        "prefix cleanup completed"
    );
    Ok(stats)
}

/// Learning material of one experiment: `{experimentId}/resource/`.
pub async fn delete_experiment_resources(
    store: &ObjectStore,
    experiment_id: &str,
    dry_run: bool,
) -> StorageResult<CleanupStats> {
    validate_segment("experiment id", experiment_id)?;
    let prefix = format!("{}/resource/", experiment_id);
    delete_by_prefix(store, BucketKind::Resource, &prefix, dry_run).await
}

/// Code material and extracted archives of one experiment: `{experimentId}/experiment/`.
pub async fn delete_experiment_code(
    store: &ObjectStore,
    experiment_id: &str,
    dry_run: bool,
) -> StorageResult<CleanupStats> {
    validate_segment("experiment id", experiment_id)?;
    let prefix = format!("{}/experiment/", experiment_id);
    delete_by_prefix(store, BucketKind::Resource, &prefix, dry_run).await
}

/// Everything an experiment owns in the resource bucket.
pub async fn delete_experiment(
    store: &ObjectStore,
    experiment_id: &str,
    dry_run: bool,
) -> StorageResult<CleanupStats> {
    let mut stats = delete_experiment_resources(store, experiment_id, dry_run).await?;
    stats.merge(delete_experiment_code(store, experiment_id, dry_run).await?);
    Ok(stats)
}

/// Material extracted for one task: `{experimentId}/experiment/{taskId}/`.
pub async fn delete_task_material(
    store: &ObjectStore,
    experiment_id: &str,
    task_id: &str,
    dry_run: bool,
) -> StorageResult<CleanupStats> {
    validate_segment("experiment id", experiment_id)?;
    validate_segment("task id", task_id)?;
    let prefix = format!("{}/experiment/{}/", experiment_id, task_id);
    delete_by_prefix(store, BucketKind::Resource, &prefix, dry_run).await
}

/// All submissions of one student for one task: `{studentId}/{experimentId}/{taskId}/`.
pub async fn delete_task_submissions(
    store: &ObjectStore,
    student_id: &str,
    experiment_id: &str,
    task_id: &str,
    dry_run: bool,
) -> StorageResult<CleanupStats> {
    validate_segment("student id", student_id)?;
    validate_segment("experiment id", experiment_id)?;
    validate_segment("task id", task_id)?;
    let prefix = format!("{}/{}/{}/", student_id, experiment_id, task_id);
    delete_by_prefix(store, BucketKind::Submission, &prefix, dry_run).await
}

/// Every avatar ever uploaded by a user: `avatars/{userId}/`.
pub async fn delete_user_avatars(
    store: &ObjectStore,
    user_id: &str,
    dry_run: bool,
) -> StorageResult<CleanupStats> {
    validate_segment("user id", user_id)?;
    let prefix = format!("{}/{}/", AVATAR_ROOT, user_id);
    delete_by_prefix(store, BucketKind::Default, &prefix, dry_run).await
}
