//! Path classification for the distribution API.
//!
//! Repository names may contain `/`, so paths are split on the endpoint
//! markers rather than by a fixed number of segments.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryRoute<'a> {
    /// `/v2/`
    Base,
    /// `/v2/_catalog`
    Catalog,
    /// `/v2/<name>/tags/list`
    Tags { name: &'a str },
    /// `/v2/<name>/manifests/<reference>`
    Manifest { name: &'a str, reference: &'a str },
    /// `/v2/<name>/blobs/<digest>`
    Blob { name: &'a str, digest: &'a str },
    /// `/v2/<name>/blobs/uploads/`
    UploadStart { name: &'a str },
    /// `/v2/<name>/blobs/uploads/<session>`
    Upload { name: &'a str, session: &'a str },
}

impl<'a> RegistryRoute<'a> {
    /// Repository the route addresses, if any.
    pub fn repository(&self) -> Option<&'a str> {
        match *self {
            RegistryRoute::Base | RegistryRoute::Catalog => None,
            RegistryRoute::Tags { name }
            | RegistryRoute::Manifest { name, .. }
            | RegistryRoute::Blob { name, .. }
            | RegistryRoute::UploadStart { name }
            | RegistryRoute::Upload { name, .. } => Some(name),
        }
    }
}

pub fn parse_route(path: &str) -> Option<RegistryRoute<'_>> {
    let rest = path.strip_prefix("/v2")?;
    if rest.is_empty() || rest == "/" {
        return Some(RegistryRoute::Base);
    }
    let rest = rest.strip_prefix('/')?;

    if rest == "_catalog" {
        return Some(RegistryRoute::Catalog);
    }

    if let Some(name) = rest.strip_suffix("/tags/list") {
        return non_empty(name).map(|name| RegistryRoute::Tags { name });
    }

    if let Some((name, reference)) = rest.rsplit_once("/manifests/") {
        return Some(RegistryRoute::Manifest {
            name: non_empty(name)?,
            reference: non_empty(reference)?,
        });
    }

    if let Some((name, tail)) = rest.rsplit_once("/blobs/uploads") {
        let name = non_empty(name)?;
        return match tail {
            "" | "/" => Some(RegistryRoute::UploadStart { name }),
            _ => {
                let session = non_empty(tail.strip_prefix('/')?)?;
                Some(RegistryRoute::Upload { name, session })
            }
        };
    }

    if let Some((name, digest)) = rest.rsplit_once("/blobs/") {
        return Some(RegistryRoute::Blob {
            name: non_empty(name)?,
            digest: non_empty(digest)?,
        });
    }

    None
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}
