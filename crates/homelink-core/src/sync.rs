//! Synchronization engine.
//!
//! Keeps the [`EntityStore`] consistent with whichever backend is
//! authoritative:
//!
//! - signed out: a one-shot load from the local cache, seeding built-in
//!   defaults when the cache is empty
//! - signed in: live subscriptions on the replica for devices and schedules
//!   and a pull for rooms. Every push replaces the whole collection and is
//!   opportunistically written back to the cache
//!
//! Entity edits go through the write path here: mutate the store, persist
//! to the cache, then mirror to the replica when signed in. Cache and
//! mirror failures are logged and reported as events; they never roll back
//! the optimistic local state.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use homelink_store::{KeyValueStore, keys, load_json, save_json};
use homelink_types::{AuthUser, Device, Room, Schedule, defaults, now_millis};

use crate::error::{Error, Result};
use crate::events::{CollectionKind, EventDispatcher, HubEvent, Origin};
use crate::identity::{IdentityProvider, Session};
use crate::replica::{RemotePaths, ReplicaStore, Subscription, decode_collection, encode_record};
use crate::state::{Collection, Entity, EntityStore};

/// How one entity kind maps onto the store, cache and replica.
struct Binding<T: 'static> {
    kind: CollectionKind,
    id_prefix: &'static str,
    cache_key: &'static str,
    collection: fn(&EntityStore) -> &Collection<T>,
    path: fn(&RemotePaths) -> String,
    item_path: fn(&RemotePaths, &str) -> String,
    defaults: fn() -> Vec<T>,
}

static DEVICES: Binding<Device> = Binding {
    kind: CollectionKind::Devices,
    id_prefix: "device",
    cache_key: keys::DEVICES,
    collection: EntityStore::devices,
    path: RemotePaths::devices,
    item_path: RemotePaths::device,
    defaults: defaults::devices,
};

static ROOMS: Binding<Room> = Binding {
    kind: CollectionKind::Rooms,
    id_prefix: "room",
    cache_key: keys::ROOMS,
    collection: EntityStore::rooms,
    path: RemotePaths::rooms,
    item_path: RemotePaths::room,
    defaults: defaults::rooms,
};

static SCHEDULES: Binding<Schedule> = Binding {
    kind: CollectionKind::Schedules,
    id_prefix: "schedule",
    cache_key: keys::SCHEDULES,
    collection: EntityStore::schedules,
    path: RemotePaths::schedules,
    item_path: RemotePaths::schedule,
    defaults: Vec::new,
};

/// A remote mirror write.
#[derive(Debug, Clone)]
pub enum MirrorWrite {
    Set(String, Value),
    Update(String, Map<String, Value>),
    Remove(String),
}

impl MirrorWrite {
    fn path(&self) -> &str {
        match self {
            MirrorWrite::Set(path, _) | MirrorWrite::Update(path, _) | MirrorWrite::Remove(path) => {
                path
            }
        }
    }
}

struct Attachment {
    uid: String,
    cancel_token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Reconciles the entity store with the local cache and the replica.
pub struct SyncEngine {
    state: Arc<EntityStore>,
    cache: Arc<dyn KeyValueStore>,
    replica: Arc<dyn ReplicaStore>,
    events: EventDispatcher,
    session: watch::Sender<Option<String>>,
    /// Kinds whose first replica snapshot has been applied this session.
    synced: watch::Sender<HashSet<CollectionKind>>,
    attachment: Mutex<Option<Attachment>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("uid", &*self.session.borrow())
            .finish()
    }
}

impl SyncEngine {
    pub fn new(
        state: Arc<EntityStore>,
        cache: Arc<dyn KeyValueStore>,
        replica: Arc<dyn ReplicaStore>,
        events: EventDispatcher,
    ) -> Self {
        let (session, _) = watch::channel(None);
        let (synced, _) = watch::channel(HashSet::new());
        Self {
            state,
            cache,
            replica,
            events,
            session,
            synced,
            attachment: Mutex::new(None),
        }
    }

    /// Read view of the attached session.
    pub fn session(&self) -> Session {
        Session::new(self.session.subscribe())
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.borrow().is_some()
    }

    /// Replica paths of the attached user.
    pub fn paths(&self) -> Option<RemotePaths> {
        self.session.borrow().as_deref().map(RemotePaths::new)
    }

    // ======================================================================
    // Loading
    // ======================================================================

    /// One-shot load of every collection from the local cache.
    ///
    /// Devices and rooms fall back to the built-in defaults, which are then
    /// written to the cache. Schedules default to empty.
    pub async fn load_local(&self) {
        self.load_local_one(&DEVICES).await;
        self.load_local_one(&ROOMS).await;
        self.load_local_one(&SCHEDULES).await;
    }

    async fn load_local_one<T>(&self, binding: &Binding<T>)
    where
        T: Entity + Serialize + DeserializeOwned,
    {
        let collection = (binding.collection)(&self.state);
        match load_json::<Vec<T>, _>(self.cache.as_ref(), binding.cache_key).await {
            Ok(Some(items)) => {
                debug!("Loaded {} {} from cache", items.len(), binding.kind);
                let len = items.len();
                collection.set_all(items);
                self.collection_replaced(binding.kind, Origin::Local, len);
            }
            Ok(None) => {
                let items = (binding.defaults)();
                let len = items.len();
                collection.set_all(items);
                self.collection_replaced(binding.kind, Origin::Defaults, len);
                if len > 0 {
                    info!("Seeding cache with {} default {}", len, binding.kind);
                    self.persist_one(binding).await;
                }
            }
            Err(e) => {
                // Leave the unreadable blob alone; it may be recoverable.
                warn!("Could not read cached {}: {}", binding.kind, e);
                let items = (binding.defaults)();
                let len = items.len();
                collection.set_all(items);
                self.collection_replaced(binding.kind, Origin::Defaults, len);
            }
        }
    }

    fn collection_replaced(&self, kind: CollectionKind, origin: Origin, len: usize) {
        self.events
            .send(HubEvent::CollectionReplaced { kind, origin, len });
    }

    fn mark_synced(&self, kind: CollectionKind) {
        self.synced.send_if_modified(|synced| synced.insert(kind));
    }

    /// Wait until the first replica snapshot of `kind` has been applied in
    /// the current session.
    ///
    /// Never resolves while signed out; bound it with a timeout.
    pub async fn wait_synced(&self, kind: CollectionKind) {
        let mut rx = self.synced.subscribe();
        let _ = rx.wait_for(|synced| synced.contains(&kind)).await;
    }

    // ======================================================================
    // Session lifecycle
    // ======================================================================

    /// Attach to the replica as `uid`.
    ///
    /// Opens subscriptions for devices and schedules and pulls rooms. A
    /// no-op when already attached as `uid`; attached as someone else, the
    /// old subscriptions are closed first.
    pub async fn attach(self: &Arc<Self>, uid: &str) -> Result<()> {
        if self.attached_uid().as_deref() == Some(uid) {
            return Ok(());
        }
        self.teardown();

        info!("Attaching to replica as {}", uid);
        self.synced.send_replace(HashSet::new());
        self.session.send_replace(Some(uid.to_string()));
        self.events.send(HubEvent::SessionChanged {
            uid: Some(uid.to_string()),
        });

        let paths = RemotePaths::new(uid);
        let cancel_token = CancellationToken::new();

        let subscriptions = async {
            let devices = self.replica.subscribe(&(DEVICES.path)(&paths)).await?;
            let schedules = self.replica.subscribe(&(SCHEDULES.path)(&paths)).await?;
            Ok::<_, Error>((devices, schedules))
        }
        .await;

        let (devices, schedules) = match subscriptions {
            Ok(subs) => subs,
            Err(e) => {
                warn!("Could not subscribe to replica: {}", e);
                self.session.send_replace(None);
                self.events.send(HubEvent::SessionChanged { uid: None });
                self.load_local().await;
                return Err(e);
            }
        };

        let tasks = vec![
            self.spawn_follow(&DEVICES, devices, paths.clone(), cancel_token.clone()),
            self.spawn_follow(&SCHEDULES, schedules, paths.clone(), cancel_token.clone()),
        ];
        *self
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Attachment {
            uid: uid.to_string(),
            cancel_token: cancel_token.clone(),
            tasks,
        });

        self.pull_rooms(&paths, &cancel_token).await;
        Ok(())
    }

    /// Close all subscriptions and fall back to the local cache.
    pub async fn detach(&self) {
        if self.teardown() {
            info!("Detached from replica");
            self.events.send(HubEvent::SessionChanged { uid: None });
        }
        self.load_local().await;
    }

    /// Close all subscriptions without reloading. Returns whether anything
    /// was attached.
    pub fn teardown(&self) -> bool {
        let attachment = self
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.session.send_replace(None);
        self.synced.send_replace(HashSet::new());
        match attachment {
            Some(attachment) => {
                debug!(
                    "Closing {} subscriptions for {}",
                    attachment.tasks.len(),
                    attachment.uid
                );
                attachment.cancel_token.cancel();
                true
            }
            None => false,
        }
    }

    /// Close all subscriptions and wait for their tasks to finish.
    pub async fn close(&self) {
        let attachment = self
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.session.send_replace(None);
        self.synced.send_replace(HashSet::new());
        if let Some(attachment) = attachment {
            attachment.cancel_token.cancel();
            for task in attachment.tasks {
                if let Err(e) = task.await {
                    warn!("Subscription task for {} failed: {}", attachment.uid, e);
                }
            }
            debug!("Closed subscriptions for {}", attachment.uid);
        }
    }

    /// Uid of the current attachment.
    pub fn attached_uid(&self) -> Option<String> {
        self.attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|a| a.uid.clone())
    }

    /// Drive attach/detach from an identity provider until `cancel_token`
    /// is cancelled.
    ///
    /// The current auth state is applied before this returns; later changes
    /// are applied by the returned task. Cancelling detaches; the provider
    /// going away leaves the current session in place.
    pub async fn follow(
        self: &Arc<Self>,
        identity: &dyn IdentityProvider,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let mut rx = identity.on_auth_state_changed();
        let initial = rx.borrow_and_update().clone();
        self.apply_auth(initial).await;

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        engine.teardown();
                        break;
                    }
                    changed = rx.changed() => {
                        if changed.is_err() {
                            debug!("Identity provider went away, keeping current session");
                            break;
                        }
                        let user = rx.borrow_and_update().clone();
                        engine.apply_auth(user).await;
                    }
                }
            }
        })
    }

    async fn apply_auth(self: &Arc<Self>, user: Option<AuthUser>) {
        match user {
            Some(user) => {
                if let Err(e) = self.attach(&user.uid).await {
                    warn!("Staying on local cache: {}", e);
                }
            }
            None => {
                if self.attached_uid().is_some() {
                    self.detach().await;
                }
            }
        }
    }

    fn spawn_follow<T>(
        self: &Arc<Self>,
        binding: &'static Binding<T>,
        subscription: Subscription,
        paths: RemotePaths,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()>
    where
        T: Entity + Serialize + DeserializeOwned,
    {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine
                .run_subscription(binding, subscription, paths, cancel_token)
                .await;
        })
    }

    async fn run_subscription<T>(
        &self,
        binding: &Binding<T>,
        mut subscription: Subscription,
        paths: RemotePaths,
        cancel_token: CancellationToken,
    ) where
        T: Entity + Serialize + DeserializeOwned,
    {
        let mut first = true;
        loop {
            let value = tokio::select! {
                _ = cancel_token.cancelled() => break,
                value = subscription.next_value() => match value {
                    Some(value) => value,
                    None => break,
                },
            };
            if cancel_token.is_cancelled() {
                break;
            }

            let items: Vec<T> = decode_collection(&value);
            if first && items.is_empty() {
                first = false;
                let seed = (binding.defaults)();
                if !seed.is_empty() {
                    info!("Remote {} uninitialized, seeding defaults", binding.kind);
                    let len = seed.len();
                    (binding.collection)(&self.state).set_all(seed.clone());
                    self.collection_replaced(binding.kind, Origin::Defaults, len);
                    self.mark_synced(binding.kind);
                    self.seed_remote(binding, &paths, seed, &cancel_token).await;
                    continue;
                }
            }
            first = false;

            let len = items.len();
            debug!("Remote push: {} {}", len, binding.kind);
            (binding.collection)(&self.state).set_all(items);
            self.collection_replaced(binding.kind, Origin::Remote, len);
            self.mark_synced(binding.kind);
            self.persist_one(binding).await;
        }
        debug!("Subscription for {} ended", binding.kind);
    }

    async fn pull_rooms(&self, paths: &RemotePaths, cancel_token: &CancellationToken) {
        let pulled = self.replica.get(&(ROOMS.path)(paths)).await;
        if cancel_token.is_cancelled() {
            debug!("Detached before rooms arrived");
            return;
        }
        match pulled {
            Ok(value) => {
                let rooms: Vec<Room> = decode_collection(&value);
                if rooms.is_empty() {
                    let seed = defaults::rooms();
                    info!("Remote rooms uninitialized, seeding defaults");
                    self.state.rooms().set_all(seed.clone());
                    self.collection_replaced(CollectionKind::Rooms, Origin::Defaults, seed.len());
                    self.seed_remote(&ROOMS, paths, seed, cancel_token).await;
                } else {
                    let len = rooms.len();
                    self.state.rooms().set_all(rooms);
                    self.collection_replaced(CollectionKind::Rooms, Origin::Remote, len);
                }
                self.mark_synced(CollectionKind::Rooms);
                self.persist_one(&ROOMS).await;
            }
            Err(e) => {
                warn!("Could not pull rooms, using cache: {}", e);
                self.load_local_one(&ROOMS).await;
            }
        }
    }

    /// Write defaults one item at a time. Failures are logged and do not
    /// undo items already written. Stops once the attachment is torn down,
    /// so a sign-out never writes into the previous user's paths.
    // TODO: make this a conditional create so two clients seeding at once
    // cannot both write defaults.
    async fn seed_remote<T>(
        &self,
        binding: &Binding<T>,
        paths: &RemotePaths,
        items: Vec<T>,
        cancel_token: &CancellationToken,
    ) where
        T: Entity + Serialize,
    {
        for item in items {
            if cancel_token.is_cancelled() {
                debug!("Seeding {} stopped for {}", binding.kind, paths.uid());
                return;
            }
            let path = (binding.item_path)(paths, item.id());
            let write = match encode_record(&item) {
                Ok(record) => MirrorWrite::Set(path, record),
                Err(e) => {
                    warn!("Could not encode default {}: {}", item.id(), e);
                    continue;
                }
            };
            self.mirror(write).await;
        }
    }

    // ======================================================================
    // Persistence helpers
    // ======================================================================

    async fn persist_one<T>(&self, binding: &Binding<T>)
    where
        T: Entity + Serialize,
    {
        let snapshot = (binding.collection)(&self.state).snapshot();
        if let Err(e) = save_json(self.cache.as_ref(), binding.cache_key, &snapshot).await {
            warn!("Could not cache {}: {}", binding.kind, e);
        }
    }

    /// Persist one collection's current snapshot to the local cache.
    /// Failures are logged, never returned.
    pub async fn persist(&self, kind: CollectionKind) {
        match kind {
            CollectionKind::Devices => self.persist_one(&DEVICES).await,
            CollectionKind::Rooms => self.persist_one(&ROOMS).await,
            CollectionKind::Schedules => self.persist_one(&SCHEDULES).await,
        }
    }

    /// Apply a write to the replica. A failure is logged and reported as a
    /// [`HubEvent::RemoteWriteFailed`], then handed back for callers that
    /// want to inspect it.
    pub async fn mirror(&self, write: MirrorWrite) -> Option<Error> {
        let path = write.path().to_string();
        let result = match write {
            MirrorWrite::Set(path, value) => self.replica.set(&path, value).await,
            MirrorWrite::Update(path, fields) => self.replica.update(&path, fields).await,
            MirrorWrite::Remove(path) => self.replica.remove(&path).await,
        };
        match result {
            Ok(()) => None,
            Err(e) => {
                warn!("Remote write to {} failed: {}", path, e);
                self.events.send(HubEvent::RemoteWriteFailed {
                    path,
                    error: e.to_string(),
                });
                Some(e)
            }
        }
    }

    /// Mirror only when signed in.
    async fn mirror_if_attached(&self, write: impl FnOnce(&RemotePaths) -> Option<MirrorWrite>) {
        let Some(paths) = self.paths() else {
            return;
        };
        if let Some(write) = write(&paths) {
            self.mirror(write).await;
        }
    }

    async fn commit_set<T>(&self, binding: &Binding<T>, item: &T)
    where
        T: Entity + Serialize,
    {
        self.persist_one(binding).await;
        self.mirror_if_attached(|paths| match encode_record(item) {
            Ok(record) => Some(MirrorWrite::Set((binding.item_path)(paths, item.id()), record)),
            Err(e) => {
                warn!("Could not encode {}: {}", item.id(), e);
                None
            }
        })
        .await;
    }

    async fn commit_fields<T>(&self, binding: &Binding<T>, id: &str, fields: Map<String, Value>)
    where
        T: Entity + Serialize,
    {
        self.persist_one(binding).await;
        self.mirror_if_attached(|paths| {
            Some(MirrorWrite::Update((binding.item_path)(paths, id), fields))
        })
        .await;
    }

    async fn commit_remove<T>(&self, binding: &Binding<T>, id: &str)
    where
        T: Entity + Serialize,
    {
        self.persist_one(binding).await;
        self.mirror_if_attached(|paths| Some(MirrorWrite::Remove((binding.item_path)(paths, id))))
            .await;
    }

    fn assign_id(prefix: &str, id: &mut String) {
        if id.trim().is_empty() {
            *id = format!("{}-{}", prefix, Uuid::new_v4());
        }
    }

    // ======================================================================
    // Write path: devices
    // ======================================================================

    /// Add (or replace) a device. An empty id is replaced by a fresh one.
    pub async fn add_device(&self, mut device: Device) -> Result<Device> {
        Self::assign_id(DEVICES.id_prefix, &mut device.id);
        device.touch(now_millis());
        self.state.upsert_device(device.clone());
        let stored = self.state.device(&device.id).unwrap_or(device);
        info!("Added device {}", stored.id);
        self.commit_set(&DEVICES, &stored).await;
        Ok(stored)
    }

    pub async fn update_device_brightness(&self, id: &str, brightness: u8) -> Result<Device> {
        let device = self
            .state
            .update_device(id, |d| d.set_brightness(brightness))
            .ok_or_else(|| Error::device_not_found(id))?;
        self.commit_fields(&DEVICES, id, device_fields(&device, &["brightness"]))
            .await;
        Ok(device)
    }

    pub async fn rename_device(&self, id: &str, name: &str) -> Result<Device> {
        let device = self
            .state
            .update_device(id, |d| d.name = name.to_string())
            .ok_or_else(|| Error::device_not_found(id))?;
        self.commit_fields(&DEVICES, id, device_fields(&device, &["name"]))
            .await;
        Ok(device)
    }

    /// Move a device to a room, or out of any room with `None`.
    pub async fn assign_device_room(&self, id: &str, room: Option<&str>) -> Result<Device> {
        let device = self
            .state
            .update_device(id, |d| d.room = room.map(str::to_string))
            .ok_or_else(|| Error::device_not_found(id))?;
        self.commit_fields(&DEVICES, id, device_fields(&device, &["room"]))
            .await;
        Ok(device)
    }

    /// Mirror a device state confirmed by the controller. The cache is the
    /// caller's job; this only touches the replica.
    pub(crate) async fn mirror_device_state(&self, device: &Device) {
        let fields = device_fields(device, &["isOn", "isOnline"]);
        self.mirror_if_attached(|paths| {
            Some(MirrorWrite::Update((DEVICES.item_path)(paths, &device.id), fields))
        })
        .await;
    }

    /// Remove a device. Removing an unknown id is not an error.
    pub async fn remove_device(&self, id: &str) -> Result<()> {
        if self.state.devices().remove(id).is_some() {
            info!("Removed device {}", id);
        }
        self.commit_remove(&DEVICES, id).await;
        Ok(())
    }

    // ======================================================================
    // Write path: rooms
    // ======================================================================

    pub async fn add_room(&self, mut room: Room) -> Result<Room> {
        Self::assign_id(ROOMS.id_prefix, &mut room.id);
        self.state.rooms().upsert(room.clone());
        info!("Added room {}", room.id);
        self.commit_set(&ROOMS, &room).await;
        Ok(room)
    }

    pub async fn update_room(&self, room: Room) -> Result<Room> {
        if !self.state.rooms().contains(&room.id) {
            return Err(Error::room_not_found(&room.id));
        }
        self.state.rooms().upsert(room.clone());
        self.commit_set(&ROOMS, &room).await;
        Ok(room)
    }

    /// Remove a room. Devices keep their now-dangling room id and show as
    /// uncategorized.
    pub async fn remove_room(&self, id: &str) -> Result<()> {
        if self.state.rooms().remove(id).is_some() {
            info!("Removed room {}", id);
        }
        self.commit_remove(&ROOMS, id).await;
        Ok(())
    }

    // ======================================================================
    // Write path: schedules
    // ======================================================================

    pub async fn add_schedule(&self, mut schedule: Schedule) -> Result<Schedule> {
        Self::assign_id(SCHEDULES.id_prefix, &mut schedule.id);
        if schedule.created_at == 0 {
            schedule.created_at = now_millis();
        }
        self.state.schedules().upsert(schedule.clone());
        info!("Added schedule {} for {}", schedule.id, schedule.device_id);
        self.commit_set(&SCHEDULES, &schedule).await;
        Ok(schedule)
    }

    pub async fn update_schedule(&self, schedule: Schedule) -> Result<Schedule> {
        if !self.state.schedules().contains(&schedule.id) {
            return Err(Error::schedule_not_found(&schedule.id));
        }
        self.state.schedules().upsert(schedule.clone());
        self.commit_set(&SCHEDULES, &schedule).await;
        Ok(schedule)
    }

    /// Flip a schedule's enabled flag.
    pub async fn toggle_schedule(&self, id: &str) -> Result<Schedule> {
        let schedule = self
            .state
            .schedules()
            .modify(id, |s| s.is_enabled = !s.is_enabled)
            .ok_or_else(|| Error::schedule_not_found(id))?;
        let mut fields = Map::new();
        fields.insert("isEnabled".to_string(), Value::Bool(schedule.is_enabled));
        self.commit_fields(&SCHEDULES, id, fields).await;
        Ok(schedule)
    }

    pub async fn remove_schedule(&self, id: &str) -> Result<()> {
        if self.state.schedules().remove(id).is_some() {
            info!("Removed schedule {}", id);
        }
        self.commit_remove(&SCHEDULES, id).await;
        Ok(())
    }
}

/// Pick fields from a device record, always including `lastUpdated`.
/// Missing (`None`) fields become `null`, which deletes them remotely.
fn device_fields(device: &Device, names: &[&str]) -> Map<String, Value> {
    let record = serde_json::to_value(device).unwrap_or(Value::Null);
    names
        .iter()
        .chain(std::iter::once(&"lastUpdated"))
        .map(|name| {
            let value = record.get(*name).cloned().unwrap_or(Value::Null);
            (name.to_string(), value)
        })
        .collect()
}
