//! Built-in shader sources
//!
//! Each source is compiled as `header + chunk`; the header is the
//! `#define` block produced by `RenderOptions::header`. Every uniform and
//! attribute declared here has an entry in the default material maps.

/// Shared vertex stage
pub const VERTEX: &str = r"precision highp float;

attribute vec3 a_position;
uniform mat4 u_modelViewProjectionMatrix;

#ifndef DEPTH_ONLY
#ifdef HAS_NORMAL
attribute vec3 a_normal;
uniform mat3 u_normalMatrix;
varying vec3 v_normal;
#ifdef NORMAL_MAP
#ifdef HAS_TANGENT
attribute vec4 a_tangent;
varying vec4 v_tangent;
#endif
#endif
#endif

#ifdef HAS_TEXCOORD0
attribute vec2 a_texcoord0;
varying vec2 v_texcoord0;
#endif

#ifdef HAS_TEXCOORD1
attribute vec2 a_texcoord1;
varying vec2 v_texcoord1;
#endif

#ifdef HAS_COLOR
attribute vec4 a_color;
varying vec4 v_color;
#endif

uniform mat4 u_modelViewMatrix;
varying vec3 v_fragPos;

#ifdef RECEIVE_SHADOWS
#if defined(DIRECTIONAL_SHADOWS) || defined(SPOT_SHADOWS)
uniform mat4 u_modelMatrix;
varying vec3 v_worldPos;
#endif
#endif
#endif

void main() {
    vec4 position = vec4(a_position, 1.0);
    gl_Position = u_modelViewProjectionMatrix * position;

#ifndef DEPTH_ONLY
    v_fragPos = (u_modelViewMatrix * position).xyz;
#ifdef HAS_NORMAL
    v_normal = normalize(u_normalMatrix * a_normal);
#ifdef NORMAL_MAP
#ifdef HAS_TANGENT
    v_tangent = vec4(normalize(u_normalMatrix * a_tangent.xyz), a_tangent.w);
#endif
#endif
#endif
#ifdef HAS_TEXCOORD0
    v_texcoord0 = a_texcoord0;
#endif
#ifdef HAS_TEXCOORD1
    v_texcoord1 = a_texcoord1;
#endif
#ifdef HAS_COLOR
    v_color = a_color;
#endif
#ifdef RECEIVE_SHADOWS
#if defined(DIRECTIONAL_SHADOWS) || defined(SPOT_SHADOWS)
    v_worldPos = (u_modelMatrix * position).xyz;
#endif
#endif
#endif
}
";

/// Shared fragment stage
pub const FRAGMENT: &str = r"precision highp float;

#ifdef DEPTH_ONLY

void main() {
    gl_FragColor = vec4(gl_FragCoord.z);
}

#elif defined(VERTEX_TYPE_POSITION)

varying vec3 v_fragPos;

void main() {
    gl_FragColor = vec4(v_fragPos, 1.0);
}

#elif defined(VERTEX_TYPE_NORMAL)

#ifdef HAS_NORMAL
varying vec3 v_normal;
#endif

void main() {
#ifdef HAS_NORMAL
    gl_FragColor = vec4(normalize(v_normal) * 0.5 + 0.5, 1.0);
#else
    gl_FragColor = vec4(0.5, 0.5, 1.0, 1.0);
#endif
}

#elif defined(VERTEX_TYPE_DEPTH)

uniform float u_cameraNear;
uniform float u_cameraFar;

void main() {
    float z = gl_FragCoord.z * 2.0 - 1.0;
    float linear = (2.0 * u_cameraNear * u_cameraFar) / (u_cameraFar + u_cameraNear - z * (u_cameraFar - u_cameraNear));
    gl_FragColor = vec4(vec3(linear / u_cameraFar), 1.0);
}

#elif defined(VERTEX_TYPE_DISTANCE)

uniform float u_cameraFar;
varying vec3 v_fragPos;

void main() {
    gl_FragColor = vec4(vec3(length(v_fragPos) / u_cameraFar), 1.0);
}

#else

varying vec3 v_fragPos;
#ifdef HAS_NORMAL
varying vec3 v_normal;
#endif
#ifdef HAS_TEXCOORD0
varying vec2 v_texcoord0;
#endif
#ifdef HAS_TEXCOORD1
varying vec2 v_texcoord1;
#endif
#ifdef HAS_COLOR
varying vec4 v_color;
#endif

#ifdef DIFFUSE_MAP
uniform sampler2D u_diffuse;
#else
uniform vec4 u_diffuse;
#endif

#ifdef EMISSION_MAP
uniform sampler2D u_emission;
#endif

#ifdef TRANSPARENCY_MAP
uniform sampler2D u_transparencyMap;
#endif
uniform float u_transparency;

#ifdef ALPHA_CUTOFF
uniform float u_alphaCutoff;
#endif

#ifdef HAS_LIGHT
#ifdef AMBIENT_LIGHTS
uniform vec3 u_ambientLightsColor;
#ifdef AMBIENT_MAP
uniform sampler2D u_ambient;
#endif
#endif

#if defined(LIGHT_TYPE_PHONG) || defined(LIGHT_TYPE_BLINN_PHONG)
#ifdef SPECULAR_MAP
uniform sampler2D u_specular;
#else
uniform vec4 u_specular;
#endif
uniform float u_shininess;
#endif

#ifdef NORMAL_MAP
uniform sampler2D u_normalMap;
uniform float u_normalMapScale;
#endif

#ifdef DIRECTIONAL_LIGHTS
uniform vec3 u_directionalLightsColor[DIRECTIONAL_LIGHTS];
uniform vec3 u_directionalLightsInfo[DIRECTIONAL_LIGHTS];
#ifdef RECEIVE_SHADOWS
#ifdef DIRECTIONAL_SHADOWS
uniform sampler2D u_directionalLightsShadowMap[DIRECTIONAL_SHADOWS];
uniform vec2 u_directionalLightsShadowMapSize[DIRECTIONAL_SHADOWS];
uniform float u_directionalLightsShadowBias[DIRECTIONAL_SHADOWS];
uniform mat4 u_directionalLightSpaceMatrix[DIRECTIONAL_SHADOWS];
#endif
#endif
#endif

#ifdef POINT_LIGHTS
uniform vec3 u_pointLightsPos[POINT_LIGHTS];
uniform vec3 u_pointLightsColor[POINT_LIGHTS];
uniform vec3 u_pointLightsInfo[POINT_LIGHTS];
#endif

#ifdef SPOT_LIGHTS
uniform vec3 u_spotLightsPos[SPOT_LIGHTS];
uniform vec3 u_spotLightsDir[SPOT_LIGHTS];
uniform vec3 u_spotLightsColor[SPOT_LIGHTS];
uniform vec2 u_spotLightsCutoffs[SPOT_LIGHTS];
uniform vec3 u_spotLightsInfo[SPOT_LIGHTS];
#ifdef RECEIVE_SHADOWS
#ifdef SPOT_SHADOWS
uniform sampler2D u_spotLightsShadowMap[SPOT_SHADOWS];
uniform vec2 u_spotLightsShadowMapSize[SPOT_SHADOWS];
uniform float u_spotLightsShadowBias[SPOT_SHADOWS];
uniform mat4 u_spotLightSpaceMatrix[SPOT_SHADOWS];
#endif
#endif
#endif

#ifdef RECEIVE_SHADOWS
#if defined(DIRECTIONAL_SHADOWS) || defined(SPOT_SHADOWS)
varying vec3 v_worldPos;

float shadowFactor(sampler2D map, vec2 size, float bias, mat4 space) {
    vec4 clip = space * vec4(v_worldPos, 1.0);
    vec3 coord = clip.xyz / clip.w * 0.5 + 0.5;
    if (coord.x < 0.0 || coord.x > 1.0 || coord.y < 0.0 || coord.y > 1.0) {
        return 1.0;
    }
    float lit = 0.0;
    vec2 texel = 1.0 / size;
    for (int x = -1; x <= 1; x++) {
        for (int y = -1; y <= 1; y++) {
            float depth = texture2D(map, coord.xy + vec2(x, y) * texel).r;
            lit += coord.z - bias > depth ? 0.0 : 1.0;
        }
    }
    return lit / 9.0;
}
#endif
#endif

#ifdef SPECULAR_ENV_MAP
uniform samplerCube u_specularEnvMap;
uniform float u_reflectivity;
uniform mat4 u_viewInverseMatrix;
#endif

float specularTerm(vec3 lightDir, vec3 normal, vec3 viewDir) {
#if defined(LIGHT_TYPE_BLINN_PHONG)
    return pow(max(dot(normal, normalize(lightDir + viewDir)), 0.0), u_shininess);
#elif defined(LIGHT_TYPE_PHONG)
    return pow(max(dot(viewDir, reflect(-lightDir, normal)), 0.0), u_shininess);
#else
    return 0.0;
#endif
}
#endif

#ifdef USE_HDR
uniform float u_exposure;
#endif

#ifdef GAMMA_CORRECTION
uniform float u_gammaFactor;
#endif

#if defined(FOG_LINEAR) || defined(FOG_EXP)
uniform vec4 u_fogColor;
uniform vec3 u_fogInfo;
#endif

vec4 sampleUv(sampler2D map, int channel) {
#ifdef HAS_TEXCOORD1
    if (channel == 1) {
        return texture2D(map, v_texcoord1);
    }
#endif
#ifdef HAS_TEXCOORD0
    return texture2D(map, v_texcoord0);
#else
    return texture2D(map, vec2(0.0));
#endif
}

void main() {
#ifdef DIFFUSE_MAP
    vec4 diffuse = sampleUv(u_diffuse, DIFFUSE_MAP_UV);
#else
    vec4 diffuse = u_diffuse;
#endif
#ifdef HAS_COLOR
    diffuse *= v_color;
#endif

    float alpha = diffuse.a * u_transparency;
#ifdef TRANSPARENCY_MAP
    alpha *= sampleUv(u_transparencyMap, TRANSPARENCY_MAP_UV).r;
#endif
#ifdef ALPHA_CUTOFF
    if (alpha < u_alphaCutoff) {
        discard;
    }
#endif

    vec3 color = diffuse.rgb;

#ifdef HAS_LIGHT
#ifdef HAS_NORMAL
    vec3 normal = normalize(v_normal);
#else
    vec3 normal = normalize(cross(dFdx(v_fragPos), dFdy(v_fragPos)));
#endif
#ifdef SIDE_DOUBLE
    normal *= gl_FrontFacing ? 1.0 : -1.0;
#endif
#ifdef NORMAL_MAP
    vec3 mapped = sampleUv(u_normalMap, NORMAL_MAP_UV).xyz * 2.0 - 1.0;
    normal = normalize(normal + vec3(mapped.xy * u_normalMapScale, 0.0));
#endif
    vec3 viewDir = normalize(-v_fragPos);
#if defined(LIGHT_TYPE_PHONG) || defined(LIGHT_TYPE_BLINN_PHONG)
#ifdef SPECULAR_MAP
    vec3 specular = sampleUv(u_specular, SPECULAR_MAP_UV).rgb;
#else
    vec3 specular = u_specular.rgb;
#endif
#else
    vec3 specular = vec3(0.0);
#endif

    vec3 lit = vec3(0.0);

#ifdef AMBIENT_LIGHTS
#ifdef AMBIENT_MAP
    lit += u_ambientLightsColor * sampleUv(u_ambient, AMBIENT_MAP_UV).rgb;
#else
    lit += u_ambientLightsColor * diffuse.rgb;
#endif
#endif

#ifdef DIRECTIONAL_LIGHTS
    for (int i = 0; i < DIRECTIONAL_LIGHTS; i++) {
        vec3 lightDir = -normalize(u_directionalLightsInfo[i]);
        float shadow = 1.0;
#ifdef RECEIVE_SHADOWS
#ifdef DIRECTIONAL_SHADOWS
        if (i < DIRECTIONAL_SHADOWS) {
            shadow = shadowFactor(u_directionalLightsShadowMap[i], u_directionalLightsShadowMapSize[i], u_directionalLightsShadowBias[i], u_directionalLightSpaceMatrix[i]);
        }
#endif
#endif
        float lambert = max(dot(normal, lightDir), 0.0);
        lit += shadow * u_directionalLightsColor[i] * (diffuse.rgb * lambert + specular * specularTerm(lightDir, normal, viewDir));
    }
#endif

#ifdef POINT_LIGHTS
    for (int i = 0; i < POINT_LIGHTS; i++) {
        vec3 toLight = u_pointLightsPos[i] - v_fragPos;
        float distance = length(toLight);
        vec3 lightDir = toLight / distance;
        vec3 info = u_pointLightsInfo[i];
        float attenuation = 1.0 / (info.x + info.y * distance + info.z * distance * distance);
        float lambert = max(dot(normal, lightDir), 0.0);
        lit += attenuation * u_pointLightsColor[i] * (diffuse.rgb * lambert + specular * specularTerm(lightDir, normal, viewDir));
    }
#endif

#ifdef SPOT_LIGHTS
    for (int i = 0; i < SPOT_LIGHTS; i++) {
        vec3 toLight = u_spotLightsPos[i] - v_fragPos;
        float distance = length(toLight);
        vec3 lightDir = toLight / distance;
        float theta = dot(lightDir, -normalize(u_spotLightsDir[i]));
        vec2 cutoffs = u_spotLightsCutoffs[i];
        float cone = clamp((theta - cutoffs.y) / max(cutoffs.x - cutoffs.y, 0.0001), 0.0, 1.0);
        vec3 info = u_spotLightsInfo[i];
        float attenuation = cone / (info.x + info.y * distance + info.z * distance * distance);
        float shadow = 1.0;
#ifdef RECEIVE_SHADOWS
#ifdef SPOT_SHADOWS
        if (i < SPOT_SHADOWS) {
            shadow = shadowFactor(u_spotLightsShadowMap[i], u_spotLightsShadowMapSize[i], u_spotLightsShadowBias[i], u_spotLightSpaceMatrix[i]);
        }
#endif
#endif
        float lambert = max(dot(normal, lightDir), 0.0);
        lit += shadow * attenuation * u_spotLightsColor[i] * (diffuse.rgb * lambert + specular * specularTerm(lightDir, normal, viewDir));
    }
#endif

#ifdef SPECULAR_ENV_MAP
    vec3 reflected = (u_viewInverseMatrix * vec4(reflect(-viewDir, normal), 0.0)).xyz;
    lit = mix(lit, textureCube(u_specularEnvMap, reflected).rgb, u_reflectivity);
#endif

    color = lit;
#endif

#ifdef EMISSION_MAP
    color += sampleUv(u_emission, EMISSION_MAP_UV).rgb;
#endif

#ifdef USE_HDR
    color = vec3(1.0) - exp(-color * u_exposure);
#endif

#ifdef GAMMA_CORRECTION
    color = pow(color, vec3(1.0 / u_gammaFactor));
#endif

#if defined(FOG_LINEAR) || defined(FOG_EXP)
    float fogDepth = length(v_fragPos);
#ifdef FOG_LINEAR
    float fogAmount = clamp((fogDepth - u_fogInfo.x) / (u_fogInfo.y - u_fogInfo.x), 0.0, 1.0);
#else
    float fogAmount = 1.0 - exp(-u_fogInfo.z * u_fogInfo.z * fogDepth * fogDepth);
#endif
    color = mix(color, u_fogColor.rgb, fogAmount);
#endif

#ifdef PREMULTIPLY_ALPHA
    color *= alpha;
#endif
    gl_FragColor = vec4(color, alpha);
}

#endif
";
