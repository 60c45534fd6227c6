//! In-process FTP server for integration tests.
//!
//! Serves an in-memory tree over real sockets on 127.0.0.1 with passive
//! data channels (PASV and EPSV), MLSD and LIST listings.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

/// Server-side file tree plus accounts.
#[derive(Debug, Clone)]
pub struct FakeFs {
    nodes: BTreeMap<String, Node>,
    users: HashMap<String, String>,
    abort_next_upload: bool,
}

impl Default for FakeFs {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir);
        Self {
            nodes,
            users: HashMap::new(),
            abort_next_upload: false,
        }
    }
}

impl FakeFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, name: &str, password: &str) -> Self {
        self.users.insert(name.to_string(), password.to_string());
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.nodes.insert(path.to_string(), Node::Dir);
        self
    }

    pub fn file(mut self, path: &str, body: &[u8]) -> Self {
        self.nodes.insert(path.to_string(), Node::File(body.to_vec()));
        self
    }

    /// The next STOR reads 1 KiB, drops the data connection and replies 426.
    pub fn abort_next_upload(mut self) -> Self {
        self.abort_next_upload = true;
        self
    }

    fn is_dir(&self, path: &str) -> bool {
        matches!(self.nodes.get(path), Some(Node::Dir))
    }

    fn children(&self, dir: &str) -> Vec<(String, Node)> {
        self.nodes
            .iter()
            .filter(|(p, _)| p.as_str() != "/" && parent_of(p) == dir)
            .map(|(p, n)| (name_of(p).to_string(), n.clone()))
            .collect()
    }
}

pub struct FakeFtpServer {
    pub port: u16,
    fs: Arc<Mutex<FakeFs>>,
}

impl FakeFtpServer {
    /// Bind an ephemeral port and serve `fs` from a background thread.
    pub fn start(fs: FakeFs) -> Self {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        std_listener.set_nonblocking(true).unwrap();
        let port = std_listener.local_addr().unwrap().port();
        let fs = Arc::new(Mutex::new(fs));

        let shared = fs.clone();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                let listener = TcpListener::from_std(std_listener).unwrap();
                loop {
                    let Ok((sock, _)) = listener.accept().await else {
                        break;
                    };
                    tokio::spawn(serve(sock, shared.clone()));
                }
            });
        });

        Self { port, fs }
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.fs.lock().unwrap().nodes.get(path) {
            Some(Node::File(body)) => Some(body.clone()),
            _ => None,
        }
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.fs.lock().unwrap().is_dir(path)
    }
}

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

// ─── Paths ───────────────────────────────────────────────────────────

fn resolve(cwd: &str, arg: &str) -> String {
    let joined = if arg.starts_with('/') {
        arg.to_string()
    } else {
        format!("{}/{}", cwd, arg)
    };
    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    format!("/{}", parts.join("/"))
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(pos) => &path[..pos],
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

fn mlsd_line(name: &str, node: &Node) -> String {
    match node {
        Node::Dir => format!("type=dir;modify=20230101000000;perm=flcdmpe; {}\r\n", name),
        Node::File(body) => format!(
            "type=file;size={};modify=20230101000000;perm=adfrw; {}\r\n",
            body.len(),
            name
        ),
    }
}

fn list_line(name: &str, node: &Node) -> String {
    match node {
        Node::Dir => format!("drwxr-xr-x   2 ftp ftp {:>8} Jan  1  2023 {}\r\n", 0, name),
        Node::File(body) => format!(
            "-rw-r--r--   1 ftp ftp {:>8} Jan  1  2023 {}\r\n",
            body.len(),
            name
        ),
    }
}

// ─── Protocol ────────────────────────────────────────────────────────

struct Conn {
    out: OwnedWriteHalf,
    fs: Arc<Mutex<FakeFs>>,
    cwd: String,
    user: Option<String>,
    logged_in: bool,
    rename_from: Option<String>,
    passive: Option<TcpListener>,
}

impl Conn {
    async fn reply(&mut self, text: &str) {
        let _ = self.out.write_all(format!("{}\r\n", text).as_bytes()).await;
    }

    async fn open_passive(&mut self) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        self.passive = Some(listener);
        port
    }

    async fn accept_data(&mut self) -> Option<TcpStream> {
        let listener = self.passive.take()?;
        listener.accept().await.ok().map(|(s, _)| s)
    }

    /// 150, body over the data channel, 226.
    async fn send_data(&mut self, body: Vec<u8>) {
        let Some(mut data) = self.accept_data().await else {
            self.reply("425 Use PASV first").await;
            return;
        };
        self.reply("150 Opening BINARY mode data connection").await;
        let _ = data.write_all(&body).await;
        let _ = data.shutdown().await;
        drop(data);
        self.reply("226 Transfer complete").await;
    }

    async fn handle(&mut self, verb: &str, arg: &str) -> bool {
        if !self.logged_in && !matches!(verb, "USER" | "PASS" | "QUIT" | "FEAT" | "SYST") {
            self.reply("530 Please login with USER and PASS").await;
            return true;
        }
        match verb {
            "USER" => {
                self.user = Some(arg.to_string());
                self.reply("331 Password required").await;
            }
            "PASS" => {
                let user = self.user.clone().unwrap_or_default();
                let ok = user == "anonymous"
                    || self.fs.lock().unwrap().users.get(&user).map(String::as_str) == Some(arg);
                if ok {
                    self.logged_in = true;
                    self.reply("230 Login successful.").await;
                } else {
                    self.reply("530 Login incorrect.").await;
                }
            }
            "SYST" => self.reply("215 UNIX Type: L8").await,
            "FEAT" => {
                self.reply("211-Features:\r\n MLSD\r\n EPSV\r\n UTF8\r\n SIZE\r\n211 End").await
            }
            "OPTS" | "TYPE" | "NOOP" => self.reply("200 OK").await,
            "PWD" => {
                let text = format!("257 \"{}\" is the current directory", self.cwd.replace('"', "\"\""));
                self.reply(&text).await;
            }
            "CWD" => {
                let target = resolve(&self.cwd, arg);
                if self.fs.lock().unwrap().is_dir(&target) {
                    self.cwd = target;
                    self.reply("250 Directory successfully changed.").await;
                } else {
                    self.reply(&format!("550 {}: No such directory", arg)).await;
                }
            }
            "PASV" => {
                let port = self.open_passive().await;
                let text = format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{})",
                    port / 256,
                    port % 256
                );
                self.reply(&text).await;
            }
            "EPSV" => {
                let port = self.open_passive().await;
                self.reply(&format!("229 Entering Extended Passive Mode (|||{}|)", port))
                    .await;
            }
            "MLSD" | "LIST" | "NLST" => {
                let target = resolve(&self.cwd, arg);
                let (body, exists) = {
                    let fs = self.fs.lock().unwrap();
                    let body = match fs.nodes.get(&target) {
                        Some(Node::Dir) => Some(
                            fs.children(&target)
                                .iter()
                                .map(|(name, node)| match verb {
                                    "MLSD" => mlsd_line(name, node),
                                    "LIST" => list_line(name, node),
                                    _ => format!("{}\r\n", name),
                                })
                                .collect::<String>(),
                        ),
                        Some(node) if verb == "LIST" => Some(list_line(name_of(&target), node)),
                        _ => None,
                    };
                    (body, fs.nodes.contains_key(&target))
                };
                match body {
                    Some(body) => self.send_data(body.into_bytes()).await,
                    None if verb == "MLSD" && exists => {
                        self.passive = None;
                        self.reply("501 Not a directory").await;
                    }
                    None => {
                        self.passive = None;
                        self.reply(&format!("550 {}: No such file or directory", arg)).await;
                    }
                }
            }
            "RETR" => {
                let target = resolve(&self.cwd, arg);
                let body = match self.fs.lock().unwrap().nodes.get(&target) {
                    Some(Node::File(body)) => Some(body.clone()),
                    _ => None,
                };
                match body {
                    Some(body) => self.send_data(body).await,
                    None => {
                        self.passive = None;
                        self.reply(&format!("550 {}: No such file or directory", arg)).await;
                    }
                }
            }
            "STOR" => {
                let target = resolve(&self.cwd, arg);
                if !self.fs.lock().unwrap().is_dir(parent_of(&target)) {
                    self.passive = None;
                    self.reply(&format!("553 {}: Could not create file", arg)).await;
                    return true;
                }
                let Some(mut data) = self.accept_data().await else {
                    self.reply("425 Use PASV first").await;
                    return true;
                };
                self.reply("150 Ok to send data").await;
                let abort = std::mem::take(&mut self.fs.lock().unwrap().abort_next_upload);
                if abort {
                    let mut head = [0u8; 1024];
                    let _ = data.read_exact(&mut head).await;
                    drop(data);
                    self.reply("426 Connection closed; transfer aborted.").await;
                    return true;
                }
                let mut body = Vec::new();
                let _ = data.read_to_end(&mut body).await;
                self.fs.lock().unwrap().nodes.insert(target, Node::File(body));
                self.reply("226 Transfer complete").await;
            }
            "DELE" => {
                let target = resolve(&self.cwd, arg);
                let removed = {
                    let mut fs = self.fs.lock().unwrap();
                    match fs.nodes.get(&target) {
                        Some(Node::File(_)) => fs.nodes.remove(&target).is_some(),
                        _ => false,
                    }
                };
                if removed {
                    self.reply("250 Delete operation successful.").await;
                } else {
                    self.reply(&format!("550 {}: No such file", arg)).await;
                }
            }
            "MKD" => {
                let target = resolve(&self.cwd, arg);
                let created = {
                    let mut fs = self.fs.lock().unwrap();
                    if fs.is_dir(parent_of(&target)) && !fs.nodes.contains_key(&target) {
                        fs.nodes.insert(target.clone(), Node::Dir);
                        true
                    } else {
                        false
                    }
                };
                if created {
                    self.reply(&format!("257 \"{}\" created", target)).await;
                } else {
                    self.reply(&format!("550 {}: Create directory operation failed.", arg))
                        .await;
                }
            }
            "RMD" => {
                let target = resolve(&self.cwd, arg);
                let removed = {
                    let mut fs = self.fs.lock().unwrap();
                    if target != "/" && fs.is_dir(&target) && fs.children(&target).is_empty() {
                        fs.nodes.remove(&target);
                        true
                    } else {
                        false
                    }
                };
                if removed {
                    self.reply("250 Remove directory operation successful.").await;
                } else {
                    self.reply(&format!("550 {}: Remove directory operation failed.", arg))
                        .await;
                }
            }
            "RNFR" => {
                let target = resolve(&self.cwd, arg);
                if self.fs.lock().unwrap().nodes.contains_key(&target) {
                    self.rename_from = Some(target);
                    self.reply("350 Ready for RNTO.").await;
                } else {
                    self.reply(&format!("550 {}: No such file or directory", arg)).await;
                }
            }
            "RNTO" => {
                let Some(from) = self.rename_from.take() else {
                    self.reply("503 RNFR required first.").await;
                    return true;
                };
                let to = resolve(&self.cwd, arg);
                {
                    let mut fs = self.fs.lock().unwrap();
                    let prefix = format!("{}/", from);
                    let moved: Vec<String> = fs
                        .nodes
                        .keys()
                        .filter(|k| **k == from || k.starts_with(&prefix))
                        .cloned()
                        .collect();
                    for old in moved {
                        if let Some(node) = fs.nodes.remove(&old) {
                            let new = format!("{}{}", to, &old[from.len()..]);
                            fs.nodes.insert(new, node);
                        }
                    }
                }
                self.reply("250 Rename successful.").await;
            }
            "QUIT" => {
                self.reply("221 Goodbye.").await;
                return false;
            }
            "SITE" if arg.to_ascii_uppercase().starts_with("EXEC") => {
                self.reply("150 Running command").await;
                self.reply("250 EXEC finished").await;
            }
            _ => self.reply(&format!("502 {} not implemented.", verb)).await,
        }
        true
    }
}

async fn serve(sock: TcpStream, fs: Arc<Mutex<FakeFs>>) {
    let (rd, out) = sock.into_split();
    let mut conn = Conn {
        out,
        fs,
        cwd: "/".to_string(),
        user: None,
        logged_in: false,
        rename_from: None,
        passive: None,
    };
    conn.reply("220 fake FTP server ready").await;

    let mut lines = BufReader::new(rd).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end_matches('\r');
        let (verb, arg) = match line.split_once(' ') {
            Some((v, a)) => (v.to_ascii_uppercase(), a.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };
        if !conn.handle(&verb, &arg).await {
            break;
        }
    }
}
