//! Route patterns for invalidation.
//!
//! A [`RoutePatternProvider`] tells the server pipeline which patterns a
//! cached GET is indexed under and which patterns a mutation invalidates.
//!
//! Two providers ship with the crate:
//!
//! - [`TemplatePatternProvider`] matches paths against route templates such
//!   as `/api/cars/{id?}` and derives `/api/cars/+` (instance) or
//!   `/api/cars/*` (collection) from the last template parameter
//! - [`RestfulPatternProvider`] needs no templates and links a path to its
//!   ancestors, so that `/api/parents/1/children/2` is dropped when
//!   `/api/parents/1/children` or `/api/parents/1` change

use actix_router::{Path, ResourceDef};
use heifer_core::RoutePattern;
use heifer_core::route::{COLLECTION_MARKER, INSTANCE_MARKER};
use thiserror::Error;

/// Maps request paths to invalidation patterns.
pub trait RoutePatternProvider: Send + Sync {
    /// Patterns a cached GET of `path` is indexed under.
    fn links(&self, path: &str) -> Vec<RoutePattern>;

    /// Patterns to invalidate after a successful mutation of `path`.
    fn invalidations(&self, path: &str) -> Vec<RoutePattern>;

    /// Collection pattern of a resource created at `location`.
    fn collection_of(&self, location: &str) -> Option<RoutePattern>;
}

/// Invalid route template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteTemplateError {
    /// An optional parameter is followed by more segments.
    #[error("optional parameter `{0}` must be the last segment")]
    OptionalNotLast(String),
    /// A `{` without matching `}` or an empty parameter name.
    #[error("malformed parameter segment `{0}`")]
    MalformedParameter(String),
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param {
        name: String,
        regex: Option<String>,
        optional: bool,
    },
}

impl Segment {
    fn parse(raw: &str) -> Result<Self, RouteTemplateError> {
        if !raw.starts_with('{') {
            return Ok(Segment::Literal(raw.to_owned()));
        }
        let inner = raw
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| RouteTemplateError::MalformedParameter(raw.to_owned()))?;
        let (name, regex) = match inner.split_once(':') {
            Some((name, regex)) => (name, Some(regex.to_owned())),
            None => (inner, None),
        };
        let (name, optional) = match name.strip_suffix('?') {
            Some(name) => (name, true),
            None => (name, false),
        };
        if name.is_empty() {
            return Err(RouteTemplateError::MalformedParameter(raw.to_owned()));
        }
        Ok(Segment::Param {
            name: name.to_owned(),
            regex,
            optional,
        })
    }

    fn as_resource(&self) -> String {
        match self {
            Segment::Literal(literal) => literal.clone(),
            Segment::Param {
                name,
                regex: Some(regex),
                ..
            } => format!("{{{name}:{regex}}}"),
            Segment::Param { name, .. } => format!("{{{name}}}"),
        }
    }
}

/// A route template with ordered positional parameters.
///
/// Supported segment forms are literals, `{name}`, `{name:regex}` and, as the
/// last segment only, `{name?}`.
#[derive(Debug, Clone)]
pub struct RouteTemplate {
    template: String,
    segments: Vec<Segment>,
    bound: ResourceDef,
    unbound: Option<ResourceDef>,
}

impl RouteTemplate {
    pub fn parse(template: &str) -> Result<Self, RouteTemplateError> {
        let segments = template
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(Segment::parse)
            .collect::<Result<Vec<_>, _>>()?;

        let last = segments.len().saturating_sub(1);
        for (index, segment) in segments.iter().enumerate() {
            if let Segment::Param {
                name,
                optional: true,
                ..
            } = segment
            {
                if index != last {
                    return Err(RouteTemplateError::OptionalNotLast(name.clone()));
                }
            }
        }

        let join = |segments: &[Segment]| {
            let path: Vec<String> = segments.iter().map(Segment::as_resource).collect();
            format!("/{}", path.join("/"))
        };
        let bound = ResourceDef::new(join(&segments));
        let unbound = match segments.last() {
            Some(Segment::Param { optional: true, .. }) => {
                Some(ResourceDef::new(join(&segments[..last])))
            }
            _ => None,
        };

        Ok(Self {
            template: template.to_owned(),
            segments,
            bound,
            unbound,
        })
    }

    /// The template as registered.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    fn last_param(&self) -> Option<usize> {
        self.segments
            .iter()
            .rposition(|segment| matches!(segment, Segment::Param { .. }))
    }

    /// Matches `path`, returning `(pattern, collection pattern)`.
    fn match_path(&self, path: &str) -> Option<(RoutePattern, RoutePattern)> {
        let mut captured = Path::new(path);
        let last_bound = if self.bound.capture_match_info(&mut captured) {
            true
        } else {
            let unbound = self.unbound.as_ref()?;
            captured = Path::new(path);
            if !unbound.capture_match_info(&mut captured) {
                return None;
            }
            false
        };

        let Some(last_param) = self.last_param() else {
            // Literal template: the path itself names a collection.
            let collection = RoutePattern::collection(&self.render(&captured, usize::MAX, None));
            return Some((collection.clone(), collection));
        };

        let marker = if last_bound {
            INSTANCE_MARKER
        } else {
            COLLECTION_MARKER
        };
        let pattern = RoutePattern::new(self.render(&captured, last_param, Some(marker)));
        let collection = RoutePattern::new(self.render(&captured, last_param, Some(COLLECTION_MARKER)));
        Some((pattern, collection))
    }

    fn render(&self, captured: &Path<&str>, last_param: usize, marker: Option<char>) -> String {
        let mut rendered = String::new();
        for (index, segment) in self.segments.iter().enumerate() {
            let piece = match segment {
                _ if index == last_param => match marker {
                    Some(marker) => marker.to_string(),
                    None => continue,
                },
                Segment::Literal(literal) => literal.clone(),
                Segment::Param { name, .. } => match captured.get(name) {
                    Some(value) => value.to_owned(),
                    None => continue,
                },
            };
            rendered.push('/');
            rendered.push_str(&piece);
        }
        if rendered.is_empty() {
            rendered.push('/');
        }
        rendered
    }
}

/// Derives patterns from registered route templates.
///
/// Templates are tried in registration order; paths matching none get no
/// patterns.
#[derive(Debug, Clone, Default)]
pub struct TemplatePatternProvider {
    templates: Vec<RouteTemplate>,
}

impl TemplatePatternProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a template.
    pub fn route(mut self, template: &str) -> Result<Self, RouteTemplateError> {
        self.templates.push(RouteTemplate::parse(template)?);
        Ok(self)
    }

    /// Pattern and collection pattern of the first matching template.
    pub fn resolve(&self, path: &str) -> Option<(RoutePattern, RoutePattern)> {
        self.templates
            .iter()
            .find_map(|template| template.match_path(path))
    }
}

impl RoutePatternProvider for TemplatePatternProvider {
    fn links(&self, path: &str) -> Vec<RoutePattern> {
        self.resolve(path)
            .map(|(pattern, _)| vec![pattern])
            .unwrap_or_default()
    }

    fn invalidations(&self, path: &str) -> Vec<RoutePattern> {
        self.collection_of(path).into_iter().collect()
    }

    fn collection_of(&self, location: &str) -> Option<RoutePattern> {
        self.resolve(location).map(|(_, collection)| collection)
    }
}

/// Links paths to their ancestors without any route registration.
///
/// An instance path links to itself and its collection. With a parent
/// instance above that collection (four segments or more) it also links to
/// the parent, so `/api/parents/1/children/2` follows `/api/parents/1`. A
/// single leading segment such as `/api` is never linked nor invalidated.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestfulPatternProvider;

impl RestfulPatternProvider {
    fn segments(path: &str) -> Vec<&str> {
        path.split('/').filter(|s| !s.is_empty()).collect()
    }

    fn prefix(segments: &[&str], len: usize) -> RoutePattern {
        RoutePattern::new(format!("/{}", segments[..len].join("/")))
    }
}

impl RoutePatternProvider for RestfulPatternProvider {
    fn links(&self, path: &str) -> Vec<RoutePattern> {
        let segments = Self::segments(path);
        let count = segments.len();
        let mut links = vec![Self::prefix(&segments, count)];
        if count >= 3 {
            links.push(Self::prefix(&segments, count - 1));
        }
        if count >= 4 {
            links.push(Self::prefix(&segments, count - 2));
        }
        links
    }

    fn invalidations(&self, path: &str) -> Vec<RoutePattern> {
        let segments = Self::segments(path);
        let mut patterns = vec![Self::prefix(&segments, segments.len())];
        patterns.extend(self.collection_of(path));
        patterns
    }

    fn collection_of(&self, location: &str) -> Option<RoutePattern> {
        let segments = Self::segments(location);
        (segments.len() >= 3).then(|| Self::prefix(&segments, segments.len() - 1))
    }
}
