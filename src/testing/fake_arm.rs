//! An in-memory Resource Manager.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::client::ArmTransport;
use crate::error::ProviderError;

/// HTTP verb of a recorded request. `List` is a collection GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Single resource GET.
    Get,
    /// Collection GET.
    List,
    /// PUT.
    Put,
    /// PATCH.
    Patch,
    /// POST action.
    Post,
    /// DELETE.
    Delete,
}

/// One call made against a [`FakeArm`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// The verb.
    pub method: Method,
    /// The resource path.
    pub path: String,
    /// The `api-version` passed.
    pub api_version: String,
    /// The request body, for writes.
    pub body: Option<Value>,
}

type WriteHook = Arc<dyn Fn(&str, &mut Value) + Send + Sync>;

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Value>,
    lists: HashMap<String, Vec<Value>>,
    scripted: HashMap<String, VecDeque<Option<Value>>>,
    failures: HashMap<(Method, String), (u16, String)>,
    hooks: Vec<(String, WriteHook)>,
    requests: Vec<RecordedRequest>,
}

/// An [`ArmTransport`] backed by a map of paths to JSON bodies.
///
/// Writes complete immediately. PUT and PATCH merge the body into the
/// stored object and stamp `id` and `name` from the path. Deleting a
/// resource removes its children too.
#[derive(Default)]
pub struct FakeArm {
    state: Mutex<State>,
}

impl fmt::Debug for FakeArm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("FakeArm")
            .field("objects", &state.objects.len())
            .field("requests", &state.requests.len())
            .finish()
    }
}

impl FakeArm {
    /// An empty fake.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` at `path` as if it already existed remotely.
    pub fn seed(&self, path: &str, value: Value) {
        let mut stored = Value::Object(Map::new());
        merge(&mut stored, &value);
        stamp(path, &mut stored);
        self.lock().objects.insert(path.to_string(), stored);
    }

    /// The object stored at `path`.
    pub fn object(&self, path: &str) -> Option<Value> {
        self.lock().objects.get(path).cloned()
    }

    /// Whether an object is stored at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.lock().objects.contains_key(path)
    }

    /// Serve `items` for a collection GET of `path` instead of stored children.
    pub fn seed_list(&self, path: &str, items: Vec<Value>) {
        self.lock().lists.insert(path.to_string(), items);
    }

    /// Answer the next GETs of `path` from `responses` in order, `None`
    /// meaning 404, before falling back to the stored object.
    pub fn script_get(&self, path: &str, responses: impl IntoIterator<Item = Option<Value>>) {
        self.lock()
            .scripted
            .entry(path.to_string())
            .or_default()
            .extend(responses);
    }

    /// Fail the next `method` call on `path` with an ARM error `status`.
    pub fn fail_once(&self, method: Method, path: &str, status: u16, message: &str) {
        self.lock()
            .failures
            .insert((method, path.to_string()), (status, message.to_string()));
    }

    /// Run `hook` on the stored object after every PUT or PATCH to a path
    /// containing `fragment`.
    pub fn on_write(&self, fragment: &str, hook: impl Fn(&str, &mut Value) + Send + Sync + 'static) {
        self.lock()
            .hooks
            .push((fragment.to_string(), Arc::new(hook)));
    }

    /// Every request made so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Requests with `method` made to `path`.
    pub fn requests_to(&self, method: Method, path: &str) -> Vec<RecordedRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .cloned()
            .collect()
    }

    fn record(
        &self,
        method: Method,
        path: &str,
        api_version: &str,
        body: Option<&Value>,
    ) -> Result<(), ProviderError> {
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            method,
            path: path.to_string(),
            api_version: api_version.to_string(),
            body: body.cloned(),
        });
        match state.failures.remove(&(method, path.to_string())) {
            Some((status, message)) => Err(ProviderError::from_status(status, "Injected", &message)),
            None => Ok(()),
        }
    }

    fn write(&self, path: &str, body: &Value, create: bool) -> Result<Value, ProviderError> {
        let mut state = self.lock();
        let hooks: Vec<WriteHook> = state
            .hooks
            .iter()
            .filter(|(fragment, _)| path.contains(fragment.as_str()))
            .map(|(_, hook)| Arc::clone(hook))
            .collect();

        if !create && !state.objects.contains_key(path) {
            return Err(ProviderError::from_status(
                404,
                "ResourceNotFound",
                &format!("{path} was not found"),
            ));
        }
        let stored = state
            .objects
            .entry(path.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        merge(stored, body);
        stamp(path, stored);
        for hook in hooks {
            hook(path, stored);
        }
        Ok(stored.clone())
    }
}

/// JSON merge: objects merge key by key, `null` removes, anything else replaces.
fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(key);
                    continue;
                }
                match target.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge(existing, value)
                    },
                    _ => {
                        target.insert(key.clone(), value.clone());
                    },
                }
            }
        },
        (target, patch) => *target = patch.clone(),
    }
}

fn stamp(path: &str, value: &mut Value) {
    if let Value::Object(obj) = value {
        obj.insert("id".to_string(), Value::String(path.to_string()));
        let name = path.rsplit('/').next().unwrap_or_default();
        obj.insert("name".to_string(), Value::String(name.to_string()));
    }
}

fn is_child(collection: &str, path: &str) -> bool {
    path.strip_prefix(collection)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|name| !name.is_empty() && !name.contains('/'))
}

#[async_trait]
impl ArmTransport for FakeArm {
    async fn get(&self, path: &str, api_version: &str) -> Result<Option<Value>, ProviderError> {
        self.record(Method::Get, path, api_version, None)?;
        let mut state = self.lock();
        if let Some(next) = state.scripted.get_mut(path).and_then(VecDeque::pop_front) {
            return Ok(next);
        }
        Ok(state.objects.get(path).cloned())
    }

    async fn list(&self, path: &str, api_version: &str) -> Result<Vec<Value>, ProviderError> {
        self.record(Method::List, path, api_version, None)?;
        let state = self.lock();
        if let Some(items) = state.lists.get(path) {
            return Ok(items.clone());
        }
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| is_child(path, key))
            .map(|(_, value)| value.clone())
            .collect())
    }

    async fn put(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.record(Method::Put, path, api_version, Some(body))?;
        self.write(path, body, true).map(Some)
    }

    async fn patch(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.record(Method::Patch, path, api_version, Some(body))?;
        self.write(path, body, false).map(Some)
    }

    async fn post(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.record(Method::Post, path, api_version, Some(body))?;
        Ok(None)
    }

    async fn delete(&self, path: &str, api_version: &str) -> Result<(), ProviderError> {
        self.record(Method::Delete, path, api_version, None)?;
        let prefix = format!("{path}/");
        self.lock()
            .objects
            .retain(|key, _| key != path && !key.starts_with(&prefix));
        Ok(())
    }
}
